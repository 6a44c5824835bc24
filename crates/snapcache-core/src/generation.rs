//! Generation results and the commentator seam
//!
//! A [`Commentator`] wraps the external text generator together with the
//! deterministic fallback. The orchestrator only sees the success/failure
//! boundary; retries and connection handling belong to the implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analytics::AnalyticsSnapshot;
use crate::key::Audience;

/// Structured coaching commentary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commentary {
    /// Main commentary text
    pub text: String,
    /// Short observations worth calling out
    #[serde(default)]
    pub highlights: Vec<String>,
    /// Suggested follow-up actions
    #[serde(default)]
    pub next_steps: Vec<String>,
}

impl Commentary {
    /// One-line preview used for `last_message`
    pub fn preview(&self, max_chars: usize) -> String {
        let first_line = self.text.lines().next().unwrap_or_default().trim();
        if first_line.chars().count() <= max_chars {
            return first_line.to_owned();
        }
        let mut preview: String = first_line.chars().take(max_chars.saturating_sub(1)).collect();
        preview.push('…');
        preview
    }
}

/// Token usage reported by the generator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Output of one generation attempt, primary or fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub commentary: Commentary,
    /// Model identifier, absent for the deterministic path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl GenerationResult {
    /// Result produced without any model involvement
    pub const fn deterministic(commentary: Commentary) -> Self {
        Self {
            commentary,
            model: None,
            usage: None,
        }
    }
}

/// Failures on the generation side
///
/// All of these are recoverable from the cache's point of view: they route
/// the computation through the fallback.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Generator transport or HTTP-level failure
    #[error("generator request failed: {0}")]
    Upstream(String),

    /// Generator did not answer within the configured bound
    #[error("generator timed out after {0:?}")]
    Timeout(Duration),

    /// Generator answered with something that is not valid commentary
    #[error("generator returned malformed output: {0}")]
    Malformed(String),

    /// No generator is configured for this deployment
    #[error("no generator configured")]
    NotConfigured,

    /// The deterministic fallback itself failed
    #[error("fallback failed: {0}")]
    Fallback(String),
}

/// Produces commentary for one analytics snapshot and audience
#[async_trait]
pub trait Commentator: Send + Sync {
    /// Call the external generator
    async fn generate(
        &self,
        analytics: &AnalyticsSnapshot,
        audience: Audience,
    ) -> Result<GenerationResult, GenerationError>;

    /// Deterministic degraded summary, no I/O
    fn fallback(&self, analytics: &AnalyticsSnapshot, audience: Audience) -> Result<GenerationResult, GenerationError>;
}
