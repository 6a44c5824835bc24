//! Single-flight orchestration over the snapshot store
//!
//! [`Orchestrator::get_or_compute`] is the entry point for request-time
//! callers; [`Reconciler`] is the out-of-band caller that finishes queued
//! and abandoned work.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod error;
pub mod lock;
mod orchestrator;
mod policy;
mod reconciler;
mod service;
#[cfg(test)]
mod testing;

pub use error::{CacheError, ReconcileError};
pub use lock::{Acquire, Release, SingleFlightLock, WaitOutcome};
pub use orchestrator::{Lookup, Orchestrator, Outcome};
pub use policy::FlightPolicy;
pub use reconciler::{Reconciler, ReconcilerSettings, SweepReport};
pub use service::{CommentaryService, Enqueue};
