use std::sync::Arc;

use jiff::Timestamp;
use snapcache_core::{AnalyticsSnapshot, Commentator, OwnerToken, Snapshot, SnapshotKey, lease_cutoff};
use snapcache_store::{Change, Expected, StoreError};

use crate::{
    error::CacheError,
    orchestrator::{Lookup, Orchestrator},
};

/// Result of queueing a row for out-of-band computation
#[derive(Debug, Clone, PartialEq)]
pub enum Enqueue {
    /// Row is now COMPUTING under the queue token
    Queued(Snapshot),
    /// Row is already READY for this input
    AlreadyReady(Snapshot),
    /// A live owner is computing this input
    Held(Snapshot),
}

/// Commentary lookups bound to one generator
pub struct CommentaryService {
    orchestrator: Arc<Orchestrator>,
    commentator: Arc<dyn Commentator>,
}

impl CommentaryService {
    pub fn new(orchestrator: Arc<Orchestrator>, commentator: Arc<dyn Commentator>) -> Self {
        Self {
            orchestrator,
            commentator,
        }
    }

    pub const fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Cached commentary for `key`, generated at most once per input
    pub async fn commentary(&self, key: &SnapshotKey, analytics: &AnalyticsSnapshot) -> Result<Lookup, CacheError> {
        let audience = key.audience();
        self.orchestrator
            .get_or_compute(
                key,
                analytics,
                || self.commentator.generate(analytics, audience),
                || self.commentator.fallback(analytics, audience),
            )
            .await
    }

    /// Current row for `key`, without computing anything
    pub async fn snapshot(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, CacheError> {
        Ok(self.orchestrator.store().read(key).await?)
    }

    /// Mark `key` as needing computation for `analytics` without generating inline
    ///
    /// The reconciler picks queued rows up on its next sweep.
    pub async fn enqueue(&self, key: &SnapshotKey, analytics: &AnalyticsSnapshot) -> Result<Enqueue, CacheError> {
        let content_hash = self.orchestrator.hasher().hash(analytics)?;
        let now = Timestamp::now();

        let expected = Expected::Claimable {
            content_hash: content_hash.clone(),
            lease_cutoff: lease_cutoff(now, self.orchestrator.policy().lease),
        };
        let change = Change::Claim {
            content_hash: content_hash.clone(),
            owner_token: OwnerToken::queue(),
            computing_since: now,
        };

        let store = self.orchestrator.store();
        let queued = store.try_transition(key, expected, change).await?;
        let row = store
            .read(key)
            .await?
            .unwrap_or_else(|| Snapshot::vacant(key.clone(), content_hash.clone()));

        let result = if queued {
            tracing::info!(%key, "queued snapshot for reconciliation");
            Enqueue::Queued(row)
        } else if row.is_fresh_for(&content_hash) {
            Enqueue::AlreadyReady(row)
        } else {
            Enqueue::Held(row)
        };

        Ok(result)
    }

    /// Generate and settle a row whose lease `owner` already holds
    pub async fn compute_owned(
        &self,
        key: &SnapshotKey,
        content_hash: &str,
        owner: OwnerToken,
        analytics: &AnalyticsSnapshot,
    ) -> Result<Snapshot, StoreError> {
        let audience = key.audience();
        self.orchestrator
            .run_owned(
                key,
                content_hash,
                owner,
                || self.commentator.generate(analytics, audience),
                || self.commentator.fallback(analytics, audience),
            )
            .await
    }
}
