//! Minimal stand-ins for the external collaborators `bit-protocol` treats as opaque
//! (§6 of the spec this engine implements): the local object database, the commit
//! graph, and the batched ref storage. The real versions live in a full repository
//! implementation, which is out of scope for this engine and for this demo CLI alike —
//! this crate only drives the protocol exchange and reports what it learned.

use async_trait::async_trait;
use bit_protocol::error::Result;
use bit_protocol::oid::ObjectId;
use bit_protocol::traits::{
    ConnectivityChecker, RefDatabase, TrackingRefCommand, TrackingRefResult, TrackingRefUpdater,
};
use log::info;

/// Stands in for a freshly-cloned (or otherwise empty) local repository: nothing is
/// known locally, so every wanted object must be fetched and every tracking update is
/// a plain creation.
pub struct EmptyRefDatabase;

impl RefDatabase for EmptyRefDatabase {
    fn resolve(&self, _name: &str) -> Option<ObjectId> {
        None
    }

    fn all(&self) -> Vec<(String, ObjectId)> {
        Vec::new()
    }
}

/// Always reports "not yet reachable locally" and "not an ancestor" — conservative
/// answers that make the planner always fetch and never silently fast-forward, which
/// is the correct default when there is no real commit graph behind this demo.
pub struct AlwaysFetchConnectivity;

#[async_trait]
impl ConnectivityChecker for AlwaysFetchConnectivity {
    async fn is_reachable_from_local_refs(&self, _wanted: &[ObjectId]) -> Result<bool> {
        Ok(false)
    }

    async fn is_ancestor(&self, _ancestor: ObjectId, _descendant: ObjectId) -> Result<bool> {
        Ok(false)
    }

    async fn has_object(&self, _id: ObjectId) -> Result<bool> {
        Ok(false)
    }
}

/// Logs what would have been written to the local ref storage instead of actually
/// writing it; this CLI has no on-disk repository to update.
pub struct LoggingTrackingRefUpdater;

#[async_trait]
impl TrackingRefUpdater for LoggingTrackingRefUpdater {
    async fn apply(&self, commands: &[TrackingRefCommand], dry_run: bool) -> Result<Vec<TrackingRefResult>> {
        for cmd in commands {
            info!(
                "{}would update {} {} -> {} ({:?})",
                if dry_run { "[dry-run] " } else { "" },
                cmd.local_name,
                cmd.old,
                cmd.new,
                cmd.ty,
            );
        }
        Ok(commands.iter().map(|_| TrackingRefResult::Ok).collect())
    }
}
