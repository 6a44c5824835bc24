use serde::Deserialize;

/// Backfill reconciler configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcilerConfig {
    /// Whether the server runs the sweep loop; requires `[analytics]`
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Time between sweeps
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Maximum rows picked up per sweep
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Rows processed concurrently within a sweep
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Which candidates a sweep takes first
    #[serde(default)]
    pub order: SweepOrder,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval: default_interval(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            order: SweepOrder::default(),
        }
    }
}

/// Ordering of reconciliation candidates by `computing_since`
///
/// Queued rows always come before lease-expired rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepOrder {
    /// Longest-abandoned first
    #[default]
    OldestFirst,
    /// Most recently abandoned first
    NewestFirst,
}

#[allow(clippy::missing_const_for_fn)]
fn default_enabled() -> bool {
    false
}

fn default_interval() -> String {
    "30s".to_owned()
}

#[allow(clippy::missing_const_for_fn)]
fn default_batch_size() -> usize {
    50
}

#[allow(clippy::missing_const_for_fn)]
fn default_concurrency() -> usize {
    4
}
