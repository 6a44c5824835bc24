//! Generator trait and implementations for external text backends

pub mod anthropic;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use snapcache_config::{GeneratorConfig, GeneratorType};
use snapcache_core::{GenerationError, TokenUsage};

use crate::prompt::Prompt;

/// Unvalidated text returned by a generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCompletion {
    pub text: String,
    pub model: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// Trait implemented by each generator backend
///
/// Implementations return whatever the backend produced; callers must
/// validate it before treating it as commentary.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Send one prompt and return the raw completion text
    async fn generate(&self, prompt: &Prompt) -> Result<RawCompletion, GenerationError>;
}

/// Build the configured generator backend
///
/// # Errors
///
/// Returns an error if the backend cannot be constructed from the configuration
pub fn create_generator(config: &GeneratorConfig) -> anyhow::Result<Arc<dyn Generator>> {
    let generator: Arc<dyn Generator> = match config.provider_type {
        GeneratorType::Openai => Arc::new(openai::OpenAiGenerator::new(config)?),
        GeneratorType::Anthropic => Arc::new(anthropic::AnthropicGenerator::new(config)?),
    };

    tracing::debug!(generator = generator.name(), model = %config.model, "configured generator");
    Ok(generator)
}

/// Turn a non-success response into an upstream error
async fn upstream_error(name: &str, response: reqwest::Response) -> GenerationError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(generator = name, status = %status, "generator returned error");
    GenerationError::Upstream(format!("generator returned {status}: {body}"))
}
