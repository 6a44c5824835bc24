//! Background sweep over abandoned and queued rows
//!
//! Each sweep picks up COMPUTING rows that are queued or whose lease has
//! expired, re-acquires them through the same lock request-time callers
//! use, and drives them to READY (or FAILED). One row failing never stops
//! the rest of the batch.

use std::{sync::Arc, time::Duration};

use futures_util::{StreamExt, stream};
use jiff::Timestamp;
use snapcache_config::{ReconcilerConfig, SweepOrder, parse_duration};
use snapcache_core::{AnalyticsProvider, Metadata, OwnerToken, Snapshot, lease_cutoff};
use snapcache_store::StoreError;
use snapcache_telemetry::{KeyValue, metrics};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{CacheError, ReconcileError},
    lock::Acquire,
    service::CommentaryService,
};

/// Sweep bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerSettings {
    pub interval: Duration,
    pub batch_size: usize,
    pub concurrency: usize,
    pub order: SweepOrder,
}

impl TryFrom<&ReconcilerConfig> for ReconcilerSettings {
    type Error = anyhow::Error;

    fn try_from(config: &ReconcilerConfig) -> anyhow::Result<Self> {
        Ok(Self {
            interval: parse_duration("reconciler.interval", &config.interval)?,
            batch_size: config.batch_size,
            concurrency: config.concurrency.max(1),
            order: config.order,
        })
    }
}

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Candidate rows returned by the store
    pub scanned: usize,
    /// Rows this sweep computed and settled
    pub completed: usize,
    /// Rows another owner claimed first
    pub skipped: usize,
    /// Rows that could not be reconciled
    pub failed: usize,
}

enum RowResult {
    Completed,
    Skipped,
}

/// Drives abandoned and queued rows to completion
pub struct Reconciler {
    service: Arc<CommentaryService>,
    analytics: Arc<dyn AnalyticsProvider>,
    settings: ReconcilerSettings,
}

impl Reconciler {
    pub fn new(
        service: Arc<CommentaryService>,
        analytics: Arc<dyn AnalyticsProvider>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            service,
            analytics,
            settings,
        }
    }

    /// Run one reconciliation pass
    ///
    /// Only a failure to list candidates is returned; per-row failures are
    /// logged and counted.
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        let orchestrator = self.service.orchestrator();
        let cutoff = lease_cutoff(Timestamp::now(), orchestrator.policy().lease);

        let rows = orchestrator
            .store()
            .scan_stale(cutoff, self.settings.batch_size, self.settings.order)
            .await?;

        let mut report = SweepReport {
            scanned: rows.len(),
            ..SweepReport::default()
        };

        let results: Vec<_> = stream::iter(rows)
            .map(|row| self.reconcile(row))
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        for result in results {
            let label = match result {
                Ok(RowResult::Completed) => {
                    report.completed += 1;
                    "completed"
                }
                Ok(RowResult::Skipped) => {
                    report.skipped += 1;
                    "skipped"
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to reconcile row");
                    report.failed += 1;
                    "failed"
                }
            };
            metrics::reconcile_rows().add(1, &[KeyValue::new("result", label)]);
        }

        if report.scanned > 0 {
            tracing::info!(
                scanned = report.scanned,
                completed = report.completed,
                skipped = report.skipped,
                failed = report.failed,
                "reconciliation sweep finished"
            );
        } else {
            tracing::debug!("reconciliation sweep found nothing to do");
        }

        Ok(report)
    }

    async fn reconcile(&self, row: Snapshot) -> Result<RowResult, ReconcileError> {
        let orchestrator = self.service.orchestrator();
        let lock = orchestrator.lock();
        let lease = orchestrator.policy().lease;
        let Snapshot {
            key,
            content_hash: marked_hash,
            previous,
            ..
        } = row;
        let cache_error = |source: CacheError| ReconcileError::Cache {
            key: key.to_string(),
            source,
        };

        // Own the row before any fallible work
        let owner = OwnerToken::generate();
        let acquired = lock
            .acquire(&key, &marked_hash, owner, lease)
            .await
            .map_err(|e| cache_error(e.into()))?;

        if let Acquire::LostTo(current) = acquired {
            tracing::debug!(%key, owner = ?current, "row already claimed, skipping");
            return Ok(RowResult::Skipped);
        }

        let input = match self.analytics.analytics(key.subject_id(), key.context_id()).await {
            Ok(analytics) => orchestrator
                .hasher()
                .hash(&analytics)
                .map(|hash| (analytics, hash))
                .map_err(|e| cache_error(e.into())),
            Err(source) => Err(ReconcileError::Analytics {
                key: key.to_string(),
                source,
            }),
        };

        let (analytics, content_hash) = match input {
            Ok(input) => input,
            Err(error) => {
                tracing::warn!(%key, %error, "marking row failed, input unavailable");
                let mut metadata = Metadata::new();
                metadata.insert("error".to_owned(), error.to_string().into());
                lock.release(owner, Snapshot::failed(key.clone(), marked_hash, previous, metadata))
                    .await
                    .map_err(|e| cache_error(e.into()))?;
                return Err(error);
            }
        };

        if content_hash != marked_hash {
            tracing::debug!(%key, "analytics changed since the row was marked");

            if let Acquire::LostTo(current) = lock
                .acquire(&key, &content_hash, owner, lease)
                .await
                .map_err(|e| cache_error(e.into()))?
            {
                tracing::debug!(%key, owner = ?current, "row claimed for the new input, skipping");
                return Ok(RowResult::Skipped);
            }
        }

        let settled = self
            .service
            .compute_owned(&key, &content_hash, owner, &analytics)
            .await
            .map_err(|e| cache_error(e.into()))?;

        tracing::debug!(%key, status = %settled.status, "reconciled row");
        Ok(RowResult::Completed)
    }

    /// Sweep on the configured interval until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_ms = u64::try_from(self.settings.interval.as_millis()).unwrap_or(u64::MAX),
            batch_size = self.settings.batch_size,
            concurrency = self.settings.concurrency,
            "reconciler started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("reconciler stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.sweep().await {
                tracing::error!(error = %e, "reconciliation sweep failed");
            }
        }
    }
}
