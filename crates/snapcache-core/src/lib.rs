//! Core types for the snapcache memoized-commentary cache
//!
//! Holds the persisted snapshot model, the canonical input hasher, and the
//! collaborator traits (analytics source, commentary generator) that the
//! flight and server crates are written against.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod analytics;
mod error;
pub mod generation;
pub mod hash;
pub mod key;
pub mod snapshot;

pub use analytics::{AnalyticsError, AnalyticsProvider, AnalyticsSnapshot};
pub use error::HttpError;
pub use generation::{Commentary, Commentator, GenerationError, GenerationResult, TokenUsage};
pub use hash::{CanonicalHasher, DEFAULT_FLOAT_PRECISION, DEFAULT_UNORDERED_FIELDS, HashError, MAX_FLOAT_PRECISION};
pub use key::{Audience, KeyError, SnapshotKey};
pub use snapshot::{
    FallbackPayload, GeneratedPayload, Metadata, OwnerToken, Payload, PreviousResult, Snapshot, Source, Status,
    elapsed_between, fallback_payload, generated_payload, lease_cutoff,
};
