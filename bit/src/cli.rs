//! Command-line entry points that exercise the protocol engine end to end. This
//! crate is a thin demo harness, not a full repository implementation: the
//! collaborator stand-ins in [`crate::collaborators`] mean every fetch behaves as if
//! run against a freshly-initialized, empty local repository.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bit_protocol::connection::{Connection, ProtocolVersion};
use bit_protocol::error::{Error as EngineError, Result as EngineResult};
use bit_protocol::refs::{AdvertisedRefs, Ref};
use bit_protocol::refspec::{RefSpec, RefSpecSet};
use bit_protocol::traits::ConnectionReopener;
use bit_protocol::{advertisement, fetch, ls_refs, FetchOptions, TagOpt};
use clap::{Args, Parser, Subcommand};
use log::info;

use crate::collaborators::{AlwaysFetchConnectivity, EmptyRefDatabase, LoggingTrackingRefUpdater};
use crate::negotiator::{V0PackNegotiator, V2PackNegotiator};
use crate::transport;

#[derive(Parser, Debug)]
#[command(author, about = "minimal client-side git smart transport demo")]
struct Opts {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// list the refs a remote advertises, without fetching anything
    LsRemote(LsRemoteArgs),
    /// fetch refs from a remote and report the tracking-ref updates that would result
    Fetch(FetchArgs),
}

#[derive(Args, Debug)]
struct LsRemoteArgs {
    url: String,
    /// also print the symref target each symbolic ref resolves to
    #[arg(long)]
    symrefs: bool,
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Args, Debug)]
struct FetchArgs {
    url: String,
    /// refspecs to fetch; defaults to `+refs/heads/*:refs/remotes/<remote>/*`
    refspecs: Vec<String>,
    /// fail unless this branch is present in the advertisement (as on a clone)
    #[arg(long)]
    branch: Option<String>,
    #[arg(long, conflicts_with = "no_tags")]
    tags: bool,
    #[arg(long = "no-tags")]
    no_tags: bool,
    /// delete local tracking refs whose source is no longer advertised
    #[arg(long)]
    prune: bool,
    /// compute and report the outcome without applying any tracking-ref update
    #[arg(long = "dry-run")]
    dry_run: bool,
    #[arg(long, default_value = "origin")]
    remote: String,
    #[arg(long = "fetch-head", default_value = "FETCH_HEAD")]
    fetch_head: PathBuf,
    #[arg(long)]
    timeout: Option<u64>,
}

pub fn run<T: Into<OsString> + Clone>(args: impl IntoIterator<Item = T>) -> Result<()> {
    let opts = Opts::parse_from(args);
    let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(async move {
        match opts.cmd {
            Command::LsRemote(args) => run_ls_remote(args).await,
            Command::Fetch(args) => run_fetch(args).await,
        }
    })
}

/// Read the advertisement, following up with `ls-refs` if the peer speaks protocol
/// v2. `prefixes` narrows the v2 `ref-prefix` arguments; ignored for v0/v1, which
/// always advertises every ref up front.
async fn read_refs<R, W>(
    conn: &mut Connection<R, W>,
    prefixes: &[String],
) -> EngineResult<(ProtocolVersion, AdvertisedRefs, bit_protocol::capability::CapabilitySet)>
where
    R: tokio::io::AsyncRead + Unpin + Send,
    W: tokio::io::AsyncWrite + Unpin + Send,
{
    let advert = advertisement::read(conn).await?;
    let refs = match advert.version {
        ProtocolVersion::V0 => advert.refs,
        ProtocolVersion::V2 => {
            ls_refs::request(conn, &advert.capabilities, prefixes).await?;
            ls_refs::read_response(conn).await?
        }
    };
    Ok((advert.version, refs, advert.capabilities))
}

async fn run_ls_remote(args: LsRemoteArgs) -> Result<()> {
    let (read, write, _child) = transport::open(&args.url).await?;
    let mut conn = Connection::new(read, write, args.timeout.map(Duration::from_secs));

    let prefixes = ls_refs::prefixes(&RefSpecSet::default(), &["HEAD".to_owned()]);
    let (version, refs, _caps) =
        read_refs(&mut conn, &prefixes).await.context("reading advertisement")?;
    conn.close(true).await;

    info!("{:?} advertisement from {}", version, args.url);
    for r in refs.iter() {
        println!("{}\t{}", r.object_id(), r.name());
        if args.symrefs {
            if let Ref::Symbolic { target, .. } = r {
                println!("ref: {}\t{}", target.name(), r.name());
            }
        }
    }
    Ok(())
}

async fn run_fetch(args: FetchArgs) -> Result<()> {
    let tag_opt = if args.no_tags {
        TagOpt::NoTags
    } else if args.tags {
        TagOpt::FetchTags
    } else {
        TagOpt::AutoFollow
    };

    let raw_specs: Vec<String> = if args.refspecs.is_empty() {
        vec![format!("+refs/heads/*:refs/remotes/{}/*", args.remote)]
    } else {
        args.refspecs.clone()
    };
    let specs = raw_specs
        .iter()
        .map(|s| s.parse::<RefSpec>())
        .collect::<EngineResult<Vec<_>>>()
        .with_context(|| format!("parsing refspecs {raw_specs:?}"))?;
    let refspecs = RefSpecSet::new(specs);

    let timeout = args.timeout.map(Duration::from_secs);
    let (read, write, _child) = transport::open(&args.url).await?;
    let mut conn = Connection::new(read, write, timeout);

    let ls_refs_prefixes = ls_refs::prefixes(&refspecs, &["HEAD".to_owned()]);
    let (version, advertised, _caps) =
        read_refs(&mut conn, &ls_refs_prefixes).await.context("reading advertisement")?;

    let local = EmptyRefDatabase;
    let (plan, candidates) = fetch::plan(
        &refspecs,
        &local,
        &advertised,
        tag_opt,
        args.branch.as_deref(),
        &args.url,
    )?;

    let mut options = FetchOptions::new(args.remote.clone(), args.url.clone(), refspecs.clone());
    options.tag_opt = tag_opt;
    options.initial_branch = args.branch.clone();
    options.prune = args.prune;
    options.dry_run = args.dry_run;

    let connectivity = AlwaysFetchConnectivity;
    let updater = LoggingTrackingRefUpdater;
    let mut reopener = Reopener { url: &args.url, timeout };

    let outcome = match version {
        ProtocolVersion::V0 => {
            let mut negotiator = V0PackNegotiator::new(&mut conn);
            fetch::execute(
                plan,
                candidates,
                &refspecs,
                &local,
                &advertised,
                tag_opt,
                &options,
                &connectivity,
                &mut negotiator,
                Some(&mut reopener),
                &updater,
                &args.fetch_head,
            )
            .await?
        }
        ProtocolVersion::V2 => {
            let mut negotiator = V2PackNegotiator::new(&mut conn);
            fetch::execute(
                plan,
                candidates,
                &refspecs,
                &local,
                &advertised,
                tag_opt,
                &options,
                &connectivity,
                &mut negotiator,
                Some(&mut reopener),
                &updater,
                &args.fetch_head,
            )
            .await?
        }
    };

    conn.close(true).await;

    for (cmd, result) in &outcome.results {
        println!("{}\t{} -> {}\t{:?}", cmd.local_name, cmd.old, cmd.new, result);
    }
    if outcome.delivered_tags_implicitly {
        info!("server delivered tags implicitly via a capability effect");
    }
    Ok(())
}

/// Reopens a fresh connection to the same URL for the tag auto-follow second round
/// (§4.5 step 5): a different mirror may answer, so only the new advertisement is
/// handed back, never a raw stream.
struct Reopener<'a> {
    url: &'a str,
    timeout: Option<Duration>,
}

#[async_trait]
impl ConnectionReopener for Reopener<'_> {
    async fn reopen(&mut self, ref_prefixes: &[String]) -> EngineResult<AdvertisedRefs> {
        let (read, write, _child) = transport::open(self.url)
            .await
            .map_err(|e| EngineError::TransportFailure(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        let mut conn = Connection::new(read, write, self.timeout);
        let (_version, refs, _caps) = read_refs(&mut conn, ref_prefixes).await?;
        conn.close(true).await;
        Ok(refs)
    }
}
