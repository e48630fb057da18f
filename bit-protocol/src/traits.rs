//! The narrow trait boundaries this crate consumes (§6). Every external collaborator —
//! the local ref database, the commit-graph connectivity/ancestry checker, the batched
//! ref updater, and the pack negotiator — is a trait, not a concrete type; the real
//! implementations (object database, pack indexer, `RevWalk`) live outside this crate
//! and are out of scope (§1).

use async_trait::async_trait;

use crate::error::Result;
use crate::oid::ObjectId;

/// A read view over the local refs, keyed by full name (`refs/heads/main`, `HEAD`, …).
pub trait RefDatabase: Send + Sync {
    /// the object id `name` currently points to, if it exists locally
    fn resolve(&self, name: &str) -> Option<ObjectId>;

    /// every local ref, in no particular order
    fn all(&self) -> Vec<(String, ObjectId)>;
}

/// The commit-graph walker backing §4.5 step 6's fast-forward check and §4.7's
/// connectivity check. Both operations are phrased as simple yes/no questions so the
/// engine never needs to walk history itself.
#[async_trait]
pub trait ConnectivityChecker: Send + Sync {
    /// are all of `wanted` already reachable from some local ref? `Ok(false)` means
    /// "need to fetch"; an I/O failure surfaces as `UnableToCheckConnectivity`.
    async fn is_reachable_from_local_refs(&self, wanted: &[ObjectId]) -> Result<bool>;

    /// is `ancestor` an ancestor of (or equal to) `descendant`? Used to classify a
    /// tracking-ref update as a fast-forward (`Update`) or not.
    async fn is_ancestor(&self, ancestor: ObjectId, descendant: ObjectId) -> Result<bool>;

    /// does `id` already exist in the local object database, independent of whether
    /// any local ref currently points at it? Backs the tag auto-follow checks in §4.5
    /// steps 3 and 5, which run before the batched ref update in step 6 has happened.
    async fn has_object(&self, id: ObjectId) -> Result<bool>;
}

/// One command in a batched tracking-ref update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingRefCommand {
    pub local_name: String,
    pub old: ObjectId,
    /// `ObjectId::ZERO` for a deletion
    pub new: ObjectId,
    pub ty: TrackingRefCommandType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingRefCommandType {
    /// a fast-forward, or the ref didn't exist locally before
    Update,
    /// not a fast-forward; rejected unless the originating spec was `force`
    UpdateNonFastForward,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingRefResult {
    Ok,
    RejectedNonFastForward,
    /// the batch was aborted before this command was attempted (§7 partial success)
    RejectedAborted,
}

/// Applies a batch of tracking-ref commands atomically and reports one outcome per
/// command, in the same order. The real implementation holds its own lock(s) over the
/// ref storage; this crate only ever issues one batch per fetch (§5).
#[async_trait]
pub trait TrackingRefUpdater: Send + Sync {
    async fn apply(&self, commands: &[TrackingRefCommand], dry_run: bool) -> Result<Vec<TrackingRefResult>>;
}

/// Drives the remaining want/have/done exchange given the ask-for and have sets, and
/// hands back whatever pack bytes result to its own sink (the pack parser/indexer,
/// out of scope here). Returns whether the transfer delivered tags implicitly, e.g.
/// via a server-side `include-tag` capability effect.
#[async_trait]
pub trait PackNegotiator: Send + Sync {
    async fn negotiate(&mut self, wants: &[ObjectId], haves: &[ObjectId]) -> Result<bool>;
}

/// Re-opens a fresh connection for the tag auto-follow second round (§4.5 step 5): a
/// different mirror may answer, so the planner only learns the new advertisement, not
/// a raw byte stream. The host crate owns the actual transport and protocol-version
/// redetection; this trait is just the seam the planner calls through.
#[async_trait]
pub trait ConnectionReopener: Send {
    async fn reopen(&mut self, ref_prefixes: &[String]) -> Result<crate::refs::AdvertisedRefs>;
}
