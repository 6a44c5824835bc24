use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Already-computed analytics for one (subject, context) pair
///
/// The shape is owned by the analytics service; the cache only hashes it
/// and hands it to the prompt builder and fallback summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalyticsSnapshot(serde_json::Value);

impl AnalyticsSnapshot {
    pub const fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub const fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Top-level field lookup
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field)
    }

    /// Top-level numeric field, accepting integers and floats
    pub fn number(&self, field: &str) -> Option<f64> {
        self.0.get(field).and_then(serde_json::Value::as_f64)
    }
}

impl From<serde_json::Value> for AnalyticsSnapshot {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Errors from an analytics source
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// No analytics exist for the requested pair
    #[error("no analytics for {subject_id}/{context_id}")]
    NotFound { subject_id: String, context_id: String },

    /// The analytics source could not be reached
    #[error("analytics source unavailable: {0}")]
    Unavailable(String),
}

/// Source of analytics snapshots, used when work is picked up out-of-band
#[async_trait]
pub trait AnalyticsProvider: Send + Sync {
    async fn analytics(&self, subject_id: &str, context_id: &str) -> Result<AnalyticsSnapshot, AnalyticsError>;
}
