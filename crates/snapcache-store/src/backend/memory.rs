use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use jiff::Timestamp;
use snapcache_config::SweepOrder;
use snapcache_core::{Snapshot, SnapshotKey, Status};

use crate::{Change, Expected, SnapshotStore, StoreError};

/// Process-local snapshot store
///
/// Transitions hold the per-key shard lock for the check and the write, so
/// they are atomic within one process. Use [`super::RedisStore`] when
/// several processes share the cache.
#[derive(Clone, Default)]
pub struct MemoryStore {
    rows: Arc<DashMap<SnapshotKey, Snapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows held
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn read(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.rows.get(key).map(|row| row.value().clone()))
    }

    async fn upsert(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.rows.insert(snapshot.key.clone(), snapshot.clone());
        Ok(())
    }

    async fn try_transition(&self, key: &SnapshotKey, expected: Expected, change: Change) -> Result<bool, StoreError> {
        match self.rows.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if !expected.matches(Some(entry.get())) {
                    return Ok(false);
                }
                let current = entry.get().clone();
                entry.insert(change.apply(key, Some(current)));
            }
            Entry::Vacant(entry) => {
                if !expected.matches(None) {
                    return Ok(false);
                }
                entry.insert(change.apply(key, None));
            }
        }

        Ok(true)
    }

    async fn scan_stale(&self, cutoff: Timestamp, limit: usize, order: SweepOrder) -> Result<Vec<Snapshot>, StoreError> {
        let mut candidates: Vec<Snapshot> = self
            .rows
            .iter()
            .filter(|row| {
                row.status == Status::Computing
                    && (row.is_queued() || row.computing_since.is_none_or(|since| since <= cutoff))
            })
            .map(|row| row.value().clone())
            .collect();

        candidates.sort_by(|a, b| {
            b.is_queued().cmp(&a.is_queued()).then_with(|| match order {
                SweepOrder::OldestFirst => a.computing_since.cmp(&b.computing_since),
                SweepOrder::NewestFirst => b.computing_since.cmp(&a.computing_since),
            })
        });
        candidates.truncate(limit);

        Ok(candidates)
    }
}
