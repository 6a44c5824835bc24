use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use snapcache_core::{
    AnalyticsError, AnalyticsProvider, AnalyticsSnapshot, Audience, Commentary, Commentator, GenerationError,
    GenerationResult,
};

/// Commentator that echoes the score and counts generator calls
#[derive(Default)]
pub struct StubCommentator {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl StubCommentator {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Commentator for StubCommentator {
    async fn generate(
        &self,
        analytics: &AnalyticsSnapshot,
        audience: Audience,
    ) -> Result<GenerationResult, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(GenerationError::Upstream("503 Service Unavailable".to_owned()));
        }
        Ok(GenerationResult {
            commentary: Commentary {
                text: format!("{audience}: scored {}", analytics.number("score").unwrap_or_default()),
                highlights: Vec::new(),
                next_steps: Vec::new(),
            },
            model: Some("stub-model".to_owned()),
            usage: None,
        })
    }

    fn fallback(&self, analytics: &AnalyticsSnapshot, _: Audience) -> Result<GenerationResult, GenerationError> {
        Ok(GenerationResult::deterministic(Commentary {
            text: format!("Scored {}.", analytics.number("score").unwrap_or_default()),
            highlights: Vec::new(),
            next_steps: Vec::new(),
        }))
    }
}

/// Analytics keyed by context id; unknown contexts are not found
#[derive(Default)]
pub struct StubAnalytics {
    pub by_context: HashMap<String, serde_json::Value>,
}

impl StubAnalytics {
    pub fn with(mut self, context_id: &str, value: serde_json::Value) -> Self {
        self.by_context.insert(context_id.to_owned(), value);
        self
    }
}

#[async_trait]
impl AnalyticsProvider for StubAnalytics {
    async fn analytics(&self, subject_id: &str, context_id: &str) -> Result<AnalyticsSnapshot, AnalyticsError> {
        self.by_context
            .get(context_id)
            .cloned()
            .map(AnalyticsSnapshot::new)
            .ok_or_else(|| AnalyticsError::NotFound {
                subject_id: subject_id.to_owned(),
                context_id: context_id.to_owned(),
            })
    }
}
