//! Single-flight lock built on the store's conditional write
//!
//! Handlers share no memory, so the lock is the row itself: winning means
//! moving the row into COMPUTING under your [`OwnerToken`], and only that
//! owner may move it out again.

use std::{sync::Arc, time::Duration};

use jiff::Timestamp;
use snapcache_core::{OwnerToken, Snapshot, SnapshotKey, Status, lease_cutoff};
use snapcache_store::{Change, Expected, SnapshotStore, StoreError};
use tokio::time::Instant;

/// Result of trying to take the compute lease
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// This caller is now the sole owner
    Won,
    /// Someone else holds the row; `None` when it settled before we could look
    LostTo(Option<OwnerToken>),
}

/// Result of handing back the compute lease
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The settled row was written
    Committed,
    /// The lease had been taken over; the newer attempt was left alone
    Superseded,
}

/// Result of waiting on another owner
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// The row left COMPUTING for the awaited hash
    Settled(Snapshot),
    /// The deadline passed; carries the last row seen, if any
    TimedOut(Option<Snapshot>),
}

/// Lease-based lock over snapshot rows
#[derive(Clone)]
pub struct SingleFlightLock {
    store: Arc<dyn SnapshotStore>,
}

impl SingleFlightLock {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    /// Claim `key` for `content_hash` if it is empty, stale, failed, or abandoned
    pub async fn acquire(
        &self,
        key: &SnapshotKey,
        content_hash: &str,
        owner: OwnerToken,
        lease: Duration,
    ) -> Result<Acquire, StoreError> {
        let now = Timestamp::now();
        let expected = Expected::Claimable {
            content_hash: content_hash.to_owned(),
            lease_cutoff: lease_cutoff(now, lease),
        };
        let change = Change::Claim {
            content_hash: content_hash.to_owned(),
            owner_token: owner,
            computing_since: now,
        };

        if self.store.try_transition(key, expected, change).await? {
            tracing::debug!(%key, %owner, "acquired compute lease");
            return Ok(Acquire::Won);
        }

        let current = self.store.read(key).await?.and_then(|row| row.owner_token);
        tracing::debug!(%key, owner = ?current, "lost compute lease");
        Ok(Acquire::LostTo(current))
    }

    /// Settle the row if `owner` still holds it
    ///
    /// A superseded owner is a normal outcome after a lease takeover, not an error.
    pub async fn release(&self, owner: OwnerToken, settled: Snapshot) -> Result<Release, StoreError> {
        let key = settled.key.clone();
        let status = settled.status;

        if self
            .store
            .try_transition(&key, Expected::OwnedBy(owner), Change::Settle(Box::new(settled)))
            .await?
        {
            tracing::debug!(%key, %owner, %status, "released compute lease");
            return Ok(Release::Committed);
        }

        tracing::warn!(%key, %owner, %status, "compute lease was taken over, discarding result");
        Ok(Release::Superseded)
    }

    /// Poll until the row settles for `content_hash` or `timeout` elapses
    ///
    /// Never blocks past the deadline, including on a slow store read.
    pub async fn wait(
        &self,
        key: &SnapshotKey,
        content_hash: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<WaitOutcome, StoreError> {
        let deadline = Instant::now() + timeout;
        let mut latest = None;

        loop {
            match tokio::time::timeout_at(deadline, self.store.read(key)).await {
                Ok(row) => latest = row?,
                Err(_) => return Ok(WaitOutcome::TimedOut(latest)),
            }

            if let Some(row) = &latest
                && row.status != Status::Computing
                && row.content_hash == content_hash
            {
                return Ok(WaitOutcome::Settled(row.clone()));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(WaitOutcome::TimedOut(latest));
            }
            tokio::time::sleep_until((now + poll_interval).min(deadline)).await;
        }
    }
}
