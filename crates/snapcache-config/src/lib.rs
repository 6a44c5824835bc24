#![allow(clippy::must_use_candidate)]

pub mod analytics;
mod env;
pub mod flight;
pub mod generator;
pub mod hasher;
pub mod health;
mod loader;
pub mod reconciler;
pub mod server;
pub mod store;
pub mod telemetry;

use serde::Deserialize;

pub use analytics::*;
pub use flight::*;
pub use generator::*;
pub use hasher::*;
pub use health::*;
pub use reconciler::*;
pub use server::*;
pub use store::*;
pub use telemetry::TelemetryConfig;

/// Top-level snapcache configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Snapshot store backend
    #[serde(default)]
    pub store: StoreConfig,
    /// Lease, polling, and timeout policy for single-flight computation
    #[serde(default)]
    pub flight: FlightConfig,
    /// Canonical hasher settings
    #[serde(default)]
    pub hasher: HasherConfig,
    /// External text generator; absent means fallback-only operation
    #[serde(default)]
    pub generator: Option<GeneratorConfig>,
    /// Analytics provider used by out-of-band reconciliation
    #[serde(default)]
    pub analytics: Option<AnalyticsConfig>,
    /// Backfill reconciler
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
