//! Wiring of store, orchestrator, generator, and reconciler from configuration

use std::sync::Arc;

use anyhow::Context;
use snapcache_config::Config;
use snapcache_flight::{CommentaryService, FlightPolicy, Orchestrator, Reconciler, ReconcilerSettings};
use snapcache_llm::CommentaryEngine;

use crate::analytics::HttpAnalytics;

/// Shared components built once per process
pub struct AppState {
    pub service: Arc<CommentaryService>,
    /// Present when an `[analytics]` source is configured
    pub reconciler: Option<Arc<Reconciler>>,
}

impl AppState {
    /// Build every component from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the store, generator, or analytics client cannot
    /// be constructed, or a duration setting fails to parse
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = snapcache_store::create_store(&config.store).context("failed to create snapshot store")?;
        let policy = FlightPolicy::try_from(&config.flight)?;
        let orchestrator = Arc::new(Orchestrator::new(store, config.hasher.hasher(), policy));

        let engine = match &config.generator {
            Some(generator) => CommentaryEngine::new(Some(snapcache_llm::create_generator(generator)?)),
            None => {
                tracing::warn!("no generator configured, commentary will use the deterministic summary");
                CommentaryEngine::fallback_only()
            }
        };

        let service = Arc::new(CommentaryService::new(orchestrator, Arc::new(engine)));

        let reconciler = match &config.analytics {
            Some(analytics) => {
                let provider = Arc::new(HttpAnalytics::new(analytics).context("failed to create analytics client")?);
                let settings = ReconcilerSettings::try_from(&config.reconciler)?;
                Some(Arc::new(Reconciler::new(Arc::clone(&service), provider, settings)))
            }
            None => None,
        };

        Ok(Self { service, reconciler })
    }
}
