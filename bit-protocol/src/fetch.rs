//! The fetch planner (§4.5): the piece that turns a set of user refspecs, an
//! advertisement, and the local ref database into a concrete ask-for set, a batch of
//! tracking-ref updates, and the `FETCH_HEAD` records to append, then drives the
//! external collaborators (§6) to actually apply them.
//!
//! Split into two phases to match the spec's own numbering: `plan` is the pure,
//! synchronous part (steps 1-3 — no I/O, easy to unit test exhaustively); `execute`
//! drives the pack transfer, the optional tag-follow second round, and the batched
//! ref update (steps 4-7), all of which touch an external collaborator.

use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexMap;
use log::{debug, warn};

use crate::config::{FetchOptions, TagOpt};
use crate::error::{Error, Result};
use crate::fetch_head::{self, FetchHeadRecord};
use crate::oid::ObjectId;
use crate::refs::{AdvertisedRefs, Ref};
use crate::refspec::RefSpecSet;
use crate::traits::{
    ConnectionReopener, ConnectivityChecker, PackNegotiator, RefDatabase, TrackingRefCommand,
    TrackingRefCommandType, TrackingRefResult, TrackingRefUpdater,
};

/// One command destined for the batched tracking-ref update, before its fast-forward
/// status has been classified (§3's `TrackingRefUpdate` tuple).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingRefUpdate {
    pub remote_name: String,
    pub local_name: String,
    pub old: ObjectId,
    pub new: ObjectId,
    pub force: bool,
}

/// A tag seen in the advertisement whose peeled target wasn't already wanted or
/// local during pass 1 of tag auto-follow; revisited in pass 2 (§4.5 step 5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCandidate {
    name: String,
    tag_id: ObjectId,
    peeled: ObjectId,
}

/// The output of `plan`: everything computable without touching the network or the
/// local object database.
#[derive(Debug, Default)]
pub struct FetchPlan {
    pub ask_for: IndexMap<ObjectId, Ref>,
    pub tracking_updates: Vec<TrackingRefUpdate>,
    pub fetch_head_records: Vec<FetchHeadRecord>,
}

impl FetchPlan {
    pub fn asked_for_anything(&self) -> bool {
        !self.ask_for.is_empty()
    }
}

/// record `r` as wanted: insert into the ask-for set, build a tracking update if `dst`
/// is given (skipping a no-op where the advertised id already matches locally), and
/// append a `FETCH_HEAD` record. See §4.5 step 2, "wanting a ref has four effects".
fn want_ref(
    plan: &mut FetchPlan,
    local: &dyn RefDatabase,
    r: &Ref,
    dst: Option<&str>,
    force: bool,
    uri: &str,
) {
    let id = r.object_id();
    plan.ask_for.entry(id).or_insert_with(|| r.clone());

    if let Some(dst) = dst {
        let old = local.resolve(dst).unwrap_or(ObjectId::ZERO);
        if old != id {
            plan.tracking_updates.push(TrackingRefUpdate {
                remote_name: r.name().to_owned(),
                local_name: dst.to_owned(),
                old,
                new: id,
                force,
            });
        }
    }

    plan.fetch_head_records.push(FetchHeadRecord {
        id,
        source_ref: r.name().to_owned(),
        source_uri: uri.to_owned(),
        not_for_merge: dst.is_some(),
    });
}

/// Steps 1-3: preconditions, positive-spec expansion, and tag auto-follow pass 1.
/// Pure and synchronous — no collaborator is touched yet.
pub fn plan(
    specs: &RefSpecSet,
    local: &dyn RefDatabase,
    advertised: &AdvertisedRefs,
    tag_opt: TagOpt,
    initial_branch: Option<&str>,
    uri: &str,
) -> Result<(FetchPlan, Vec<TagCandidate>)> {
    // step 1: preconditions
    if let Some(branch) = initial_branch {
        if !advertised.is_empty() && advertised.resolve_short_name(branch).is_none() {
            return Err(Error::RemoteBranchNotFound(branch.to_owned()));
        }
    }

    let mut plan = FetchPlan::default();

    // step 2: expand positive specs
    for spec in specs.positive() {
        if spec.is_wildcard() {
            for r in advertised.iter() {
                let Some(expanded) = spec.expand(r.name()) else { continue };
                if specs.is_excluded(r.name()) {
                    continue;
                }
                want_ref(&mut plan, local, r, Some(&expanded), spec.is_force(), uri);
            }
        } else if spec.src_is_object_id() {
            let id: ObjectId = spec.src().parse()?;
            let synthetic = Ref::Direct { name: spec.src().to_owned(), target: id };
            want_ref(&mut plan, local, &synthetic, spec.dst(), spec.is_force(), uri);
        } else {
            let r = advertised
                .get(spec.src())
                .ok_or_else(|| Error::RemoteDoesNotHaveSpec(spec.src().to_owned()))?
                .clone();
            want_ref(&mut plan, local, &r, spec.dst(), spec.is_force(), uri);
        }
    }

    // step 3: tags, pass 1
    let mut candidates = Vec::new();
    match tag_opt {
        TagOpt::NoTags => {}
        TagOpt::AutoFollow => {
            for r in advertised.tags() {
                if local.resolve(r.name()).is_some() {
                    continue;
                }
                let tag_id = r.object_id();
                let peeled = r.peeled_id().unwrap_or(tag_id);
                if plan.ask_for.contains_key(&peeled) {
                    want_ref(&mut plan, local, r, Some(r.name()), true, uri);
                } else {
                    candidates.push(TagCandidate { name: r.name().to_owned(), tag_id, peeled });
                }
            }
        }
        TagOpt::FetchTags => {
            for r in advertised.tags() {
                if local.resolve(r.name()) == Some(r.object_id()) {
                    continue;
                }
                want_ref(&mut plan, local, r, Some(r.name()), true, uri);
            }
        }
    }

    debug!(
        "fetch plan: {} object(s) to ask for, {} tracking update(s), {} tag candidate(s)",
        plan.ask_for.len(),
        plan.tracking_updates.len(),
        candidates.len()
    );

    Ok((plan, candidates))
}

/// The final, post-execution result of a fetch: one outcome per attempted tracking-ref
/// command, plus whether the transfer delivered tags implicitly via a server capability.
#[derive(Debug)]
pub struct FetchOutcome {
    pub results: Vec<(TrackingRefCommand, TrackingRefResult)>,
    pub fetch_head_records: Vec<FetchHeadRecord>,
    pub delivered_tags_implicitly: bool,
}

#[allow(clippy::too_many_arguments)]
/// Steps 4-7: negotiate the pack transfer, run the tag auto-follow second round if
/// needed, classify and apply the tracking-ref batch, and write `FETCH_HEAD`.
pub async fn execute(
    mut plan: FetchPlan,
    candidates: Vec<TagCandidate>,
    specs: &RefSpecSet,
    local: &dyn RefDatabase,
    advertised: &AdvertisedRefs,
    tag_opt: TagOpt,
    options: &FetchOptions,
    connectivity: &dyn ConnectivityChecker,
    negotiator: &mut dyn PackNegotiator,
    mut reopener: Option<&mut dyn ConnectionReopener>,
    updater: &dyn TrackingRefUpdater,
    fetch_head_path: &Path,
) -> Result<FetchOutcome> {
    let haves: Vec<ObjectId> = local.all().into_iter().map(|(_, id)| id).collect();
    let mut delivered_tags_implicitly = false;

    // step 4: initial fetch
    if plan.asked_for_anything() {
        let wanted: Vec<ObjectId> = plan.ask_for.keys().copied().collect();
        if !connectivity.is_reachable_from_local_refs(&wanted).await? {
            delivered_tags_implicitly = negotiator.negotiate(&wanted, &haves).await?;
        }
    }

    // step 5: tags, pass 2 (auto-follow only)
    if tag_opt == TagOpt::AutoFollow && !candidates.is_empty() {
        if let Some(reopener) = reopener.as_deref_mut() {
            let reopen_prefixes: Vec<String> = {
                let mut names: Vec<String> = plan.ask_for.values().map(|r| r.name().to_owned()).collect();
                names.dedup();
                names
            };
            let new_advert = reopener.reopen(&reopen_prefixes).await?;

            let offered: HashSet<ObjectId> = new_advert.iter().map(Ref::object_id).collect();
            plan.ask_for.retain(|id, _| offered.contains(id));
            plan.fetch_head_records.retain(|rec| offered.contains(&rec.id));
            plan.tracking_updates.retain(|u| offered.contains(&u.new));

            let mut new_wants = Vec::new();
            for candidate in &candidates {
                if connectivity.has_object(candidate.peeled).await? {
                    let r = Ref::PeeledTag {
                        name: candidate.name.clone(),
                        target: candidate.tag_id,
                        peeled: candidate.peeled,
                    };
                    want_ref(&mut plan, local, &r, Some(&candidate.name), true, &options.uri);
                    new_wants.push(candidate.tag_id);
                }
            }

            if !new_wants.is_empty() {
                negotiator.negotiate(&new_wants, &haves).await?;
            }
        } else {
            warn!("tag auto-follow has {} candidate(s) but no reopener was supplied", candidates.len());
        }
    }

    // step 6: apply
    let mut commands = Vec::with_capacity(plan.tracking_updates.len());
    for update in &plan.tracking_updates {
        let ty = if update.old.is_zero() {
            TrackingRefCommandType::Update
        } else if connectivity.is_ancestor(update.old, update.new).await? {
            TrackingRefCommandType::Update
        } else {
            TrackingRefCommandType::UpdateNonFastForward
        };
        commands.push(TrackingRefCommand { local_name: update.local_name.clone(), old: update.old, new: update.new, ty });
    }

    if options.prune {
        for (local_name, id) in local.all() {
            let stale = specs
                .positive()
                .find_map(|spec| spec.reverse_expand(&local_name))
                .is_some_and(|src| !advertised.contains(&src));
            if stale {
                commands.push(TrackingRefCommand {
                    local_name,
                    old: id,
                    new: ObjectId::ZERO,
                    ty: TrackingRefCommandType::Delete,
                });
            }
        }
    }

    let mut results = Vec::with_capacity(commands.len());
    let mut attemptable = Vec::new();
    for (i, cmd) in commands.iter().enumerate() {
        let force = cmd.ty != TrackingRefCommandType::UpdateNonFastForward
            || plan.tracking_updates.get(i).is_some_and(|u| u.force);
        if cmd.ty == TrackingRefCommandType::UpdateNonFastForward && !force {
            results.push((cmd.clone(), TrackingRefResult::RejectedNonFastForward));
        } else {
            attemptable.push(cmd.clone());
        }
    }

    if options.dry_run {
        for cmd in attemptable {
            results.push((cmd, TrackingRefResult::Ok));
        }
    } else if !attemptable.is_empty() {
        let outcomes = updater.apply(&attemptable, false).await?;
        for (cmd, outcome) in attemptable.into_iter().zip(outcomes) {
            results.push((cmd, outcome));
        }
    }

    // step 7: FETCH_HEAD
    fetch_head::write(fetch_head_path, &plan.fetch_head_records).await?;

    Ok(FetchOutcome { results, fetch_head_records: plan.fetch_head_records, delivered_tags_implicitly })
}
