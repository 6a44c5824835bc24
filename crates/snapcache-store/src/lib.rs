//! Durable snapshot rows with an atomic conditional write
//!
//! Every mutation that may race goes through [`SnapshotStore::try_transition`],
//! which checks an [`Expected`] row state and applies a [`Change`] in one step
//! at the storage layer. Callers never read-then-write.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

pub mod backend;
mod error;
mod transition;

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use snapcache_config::{StoreConfig, SweepOrder};
use snapcache_core::{Snapshot, SnapshotKey};

pub use backend::{MemoryStore, RedisStore};
pub use error::StoreError;
pub use transition::{Change, Expected};

/// Persistent storage for snapshot rows
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Current row for `key`, or `None` if it has never been written
    async fn read(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, StoreError>;

    /// Unconditionally overwrite the row for `snapshot.key`
    async fn upsert(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Apply `change` iff the current row satisfies `expected`
    ///
    /// Returns `false` and leaves the row untouched when it does not.
    async fn try_transition(&self, key: &SnapshotKey, expected: Expected, change: Change) -> Result<bool, StoreError>;

    /// COMPUTING rows that are queued or whose `computing_since` is at or before `cutoff`
    ///
    /// Queued rows come first, then lease-expired rows in `order`.
    async fn scan_stale(&self, cutoff: Timestamp, limit: usize, order: SweepOrder) -> Result<Vec<Snapshot>, StoreError>;
}

/// Create the configured store backend
pub fn create_store(config: &StoreConfig) -> Result<Arc<dyn SnapshotStore>, StoreError> {
    match config {
        StoreConfig::Memory => {
            tracing::debug!("using in-memory snapshot store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreConfig::Redis(redis) => {
            tracing::debug!(prefix = %redis.key_prefix, "using redis snapshot store");
            Ok(Arc::new(RedisStore::new(redis.url.as_str(), &redis.key_prefix)?))
        }
    }
}
