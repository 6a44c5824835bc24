//! Read-through cache with single-flight computation
//!
//! A lookup is answered from the row when it is READY for the input hash.
//! Otherwise exactly one caller wins the lease and computes while everyone
//! else waits, bounded by [`FlightPolicy::wait_timeout`].

use std::{future::Future, sync::Arc};

use jiff::Timestamp;
use snapcache_core::{
    AnalyticsSnapshot, CanonicalHasher, GenerationError, GenerationResult, Metadata, OwnerToken, Snapshot,
    SnapshotKey, Source, fallback_payload, generated_payload,
};
use snapcache_store::{SnapshotStore, StoreError};
use snapcache_telemetry::{KeyValue, metrics};
use tokio::time::Instant;

use crate::{
    error::CacheError,
    lock::{Acquire, Release, SingleFlightLock, WaitOutcome},
    policy::FlightPolicy,
};

/// How a lookup was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// READY row for this hash was already stored
    Hit,
    /// This caller won the lease and computed the row
    Computed,
    /// Another owner computed the row while this caller waited
    Waited,
    /// The wait deadline passed; the answer is stale or pending
    TimedOut,
}

impl Outcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Computed => "computed",
            Self::Waited => "waited",
            Self::TimedOut => "timed_out",
        }
    }
}

/// Answer to one cache lookup
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub snapshot: Snapshot,
    /// Fingerprint of the analytics the caller asked about
    pub content_hash: String,
    pub outcome: Outcome,
}

impl Lookup {
    /// READY for the requested input, as opposed to stale or pending
    pub fn is_fresh(&self) -> bool {
        self.snapshot.is_fresh_for(&self.content_hash)
    }
}

/// Coordinates hashing, the store, and the single-flight lock
pub struct Orchestrator {
    store: Arc<dyn SnapshotStore>,
    lock: SingleFlightLock,
    hasher: CanonicalHasher,
    policy: FlightPolicy,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn SnapshotStore>, hasher: CanonicalHasher, policy: FlightPolicy) -> Self {
        Self {
            lock: SingleFlightLock::new(store.clone()),
            store,
            hasher,
            policy,
        }
    }

    pub const fn policy(&self) -> &FlightPolicy {
        &self.policy
    }

    pub const fn hasher(&self) -> &CanonicalHasher {
        &self.hasher
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    pub const fn lock(&self) -> &SingleFlightLock {
        &self.lock
    }

    /// Return the row for `key` and `analytics`, computing it at most once
    ///
    /// `compute` runs only on the lease owner, bounded by the generator
    /// timeout; any failure there routes through `fallback`. Only input
    /// and store errors are returned.
    pub async fn get_or_compute<C, Fut, F>(
        &self,
        key: &SnapshotKey,
        analytics: &AnalyticsSnapshot,
        compute: C,
        fallback: F,
    ) -> Result<Lookup, CacheError>
    where
        C: FnOnce() -> Fut,
        Fut: Future<Output = Result<GenerationResult, GenerationError>>,
        F: FnOnce() -> Result<GenerationResult, GenerationError>,
    {
        let started = Instant::now();
        let content_hash = self.hasher.hash(analytics)?;

        let result = self.resolve(key, content_hash, compute, fallback).await;
        let elapsed = started.elapsed();
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(lookup) => {
                let source = source_label(lookup.snapshot.source);
                let status = lookup.snapshot.status;
                let outcome = lookup.outcome.as_str();

                if lookup.outcome == Outcome::TimedOut {
                    tracing::warn!(%key, %status, source, outcome, duration_ms, "lookup resolved");
                } else {
                    tracing::info!(%key, %status, source, outcome, duration_ms, "lookup resolved");
                }

                let attributes = [KeyValue::new("outcome", outcome), KeyValue::new("source", source)];
                metrics::lookup_count().add(1, &attributes);
                metrics::record_duration(&metrics::lookup_duration(), elapsed, &attributes);
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, duration_ms, "lookup failed");
            }
        }

        result
    }

    async fn resolve<C, Fut, F>(
        &self,
        key: &SnapshotKey,
        content_hash: String,
        compute: C,
        fallback: F,
    ) -> Result<Lookup, CacheError>
    where
        C: FnOnce() -> Fut,
        Fut: Future<Output = Result<GenerationResult, GenerationError>>,
        F: FnOnce() -> Result<GenerationResult, GenerationError>,
    {
        if let Some(row) = self.store.read(key).await? {
            if row.is_fresh_for(&content_hash) {
                return Ok(Lookup {
                    snapshot: row,
                    content_hash,
                    outcome: Outcome::Hit,
                });
            }

            if row.content_hash == content_hash && row.is_held(Timestamp::now(), self.policy.lease) {
                return self.wait_for(key, content_hash).await;
            }
        }

        let owner = OwnerToken::generate();
        match self.lock.acquire(key, &content_hash, owner, self.policy.lease).await? {
            Acquire::Won => {
                let snapshot = self.run_owned(key, &content_hash, owner, compute, fallback).await?;
                Ok(Lookup {
                    snapshot,
                    content_hash,
                    outcome: Outcome::Computed,
                })
            }
            Acquire::LostTo(_) => self.wait_for(key, content_hash).await,
        }
    }

    async fn wait_for(&self, key: &SnapshotKey, content_hash: String) -> Result<Lookup, CacheError> {
        let outcome = self
            .lock
            .wait(key, &content_hash, self.policy.poll_interval, self.policy.wait_timeout)
            .await?;

        let lookup = match outcome {
            WaitOutcome::Settled(snapshot) => Lookup {
                snapshot,
                content_hash,
                outcome: Outcome::Waited,
            },
            WaitOutcome::TimedOut(latest) => {
                let snapshot = match latest {
                    Some(row) => row.stale_view().unwrap_or(row),
                    None => Snapshot::vacant(key.clone(), content_hash.clone()),
                };
                Lookup {
                    snapshot,
                    content_hash,
                    outcome: Outcome::TimedOut,
                }
            }
        };

        Ok(lookup)
    }

    /// Compute and settle a row this caller already holds the lease for
    ///
    /// Returns the settled row. If the lease was taken over meanwhile, the
    /// row is left to the new owner and the computed result is still returned.
    pub async fn run_owned<C, Fut, F>(
        &self,
        key: &SnapshotKey,
        content_hash: &str,
        owner: OwnerToken,
        compute: C,
        fallback: F,
    ) -> Result<Snapshot, StoreError>
    where
        C: FnOnce() -> Fut,
        Fut: Future<Output = Result<GenerationResult, GenerationError>>,
        F: FnOnce() -> Result<GenerationResult, GenerationError>,
    {
        let started = Instant::now();
        let timeout = self.policy.generator_timeout;

        let primary = tokio::time::timeout(timeout, compute())
            .await
            .unwrap_or_else(|_| Err(GenerationError::Timeout(timeout)));

        let settled = match primary {
            Ok(result) => {
                let (payload, metadata) = generated_payload(result);
                Snapshot::ready(key.clone(), content_hash, payload, with_duration(metadata, started))
            }
            Err(primary_error) => {
                tracing::warn!(%key, error = %primary_error, "generator failed, using fallback");

                match fallback() {
                    Ok(result) => {
                        let (payload, metadata) = fallback_payload(result, primary_error.to_string());
                        Snapshot::ready(key.clone(), content_hash, payload, with_duration(metadata, started))
                    }
                    Err(fallback_error) => {
                        tracing::error!(
                            %key,
                            generator_error = %primary_error,
                            fallback_error = %fallback_error,
                            "generator and fallback both failed"
                        );

                        let previous = self
                            .store
                            .read(key)
                            .await?
                            .filter(|row| row.owner_token == Some(owner))
                            .and_then(|row| row.previous);

                        let mut metadata = with_duration(Metadata::new(), started);
                        metadata.insert("error".to_owned(), fallback_error.to_string().into());
                        metadata.insert("generator_error".to_owned(), primary_error.to_string().into());
                        Snapshot::failed(key.clone(), content_hash, previous, metadata)
                    }
                }
            }
        };

        metrics::record_duration(
            &metrics::generation_duration(),
            started.elapsed(),
            &[KeyValue::new("source", source_label(settled.source))],
        );

        if self.lock.release(owner, settled.clone()).await? == Release::Superseded {
            tracing::debug!(%key, "returning computed result without persisting it");
        }

        Ok(settled)
    }
}

fn with_duration(mut metadata: Metadata, started: Instant) -> Metadata {
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    metadata.insert("duration_ms".to_owned(), duration_ms.into());
    metadata
}

const fn source_label(source: Option<Source>) -> &'static str {
    match source {
        Some(Source::Generated) => "generated",
        Some(Source::Fallback) => "fallback",
        None => "none",
    }
}
