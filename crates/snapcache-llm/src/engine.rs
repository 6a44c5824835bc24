use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use snapcache_core::{AnalyticsSnapshot, Audience, Commentator, GenerationError, GenerationResult};

use crate::fallback::deterministic_summary;
use crate::prompt::build_prompt;
use crate::provider::Generator;
use crate::response::parse_commentary;

/// [`Commentator`] backed by an external generator and the deterministic summary
#[derive(Clone, Default)]
pub struct CommentaryEngine {
    generator: Option<Arc<dyn Generator>>,
}

impl CommentaryEngine {
    pub fn new(generator: Option<Arc<dyn Generator>>) -> Self {
        Self { generator }
    }

    /// Engine that always resolves through the fallback
    pub fn fallback_only() -> Self {
        Self::default()
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }
}

#[async_trait]
impl Commentator for CommentaryEngine {
    async fn generate(
        &self,
        analytics: &AnalyticsSnapshot,
        audience: Audience,
    ) -> Result<GenerationResult, GenerationError> {
        let generator = self.generator.as_ref().ok_or(GenerationError::NotConfigured)?;

        let prompt = build_prompt(analytics, audience);
        let start = Instant::now();
        let raw = generator.generate(&prompt).await?;

        let commentary = parse_commentary(&raw.text).inspect_err(|e| {
            tracing::warn!(generator = generator.name(), error = %e, "rejected generator output");
        })?;

        tracing::debug!(
            generator = generator.name(),
            model = raw.model.as_deref().unwrap_or("unknown"),
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "generated commentary"
        );

        Ok(GenerationResult {
            commentary,
            model: raw.model,
            usage: raw.usage,
        })
    }

    fn fallback(&self, analytics: &AnalyticsSnapshot, audience: Audience) -> Result<GenerationResult, GenerationError> {
        Ok(GenerationResult::deterministic(deterministic_summary(analytics, audience)))
    }
}
