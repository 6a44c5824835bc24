//! Anthropic Messages API generator

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use snapcache_config::GeneratorConfig;
use snapcache_core::{GenerationError, TokenUsage};
use url::Url;

use super::{Generator, RawCompletion};
use crate::prompt::Prompt;
use crate::protocol::anthropic::{AnthropicContentBlock, AnthropicMessage, AnthropicRequest, AnthropicResponse};

/// Default Anthropic API base URL
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API generator
pub struct AnthropicGenerator {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    model: String,
    max_tokens: u32,
    temperature: Option<f64>,
}

impl AnthropicGenerator {
    /// Create from generator configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the default base URL cannot be parsed
    pub fn new(config: &GeneratorConfig) -> anyhow::Result<Self> {
        let base_url = match &config.base_url {
            Some(url) => url.clone(),
            None => Url::parse(DEFAULT_BASE_URL)?,
        };

        Ok(Self {
            client: Client::new(),
            base_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Build the messages endpoint URL
    fn messages_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/messages")
    }
}

#[async_trait]
impl Generator for AnthropicGenerator {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<RawCompletion, GenerationError> {
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: prompt.system.clone(),
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt.user.clone(),
            }],
            temperature: self.temperature,
        };

        let mut builder = self
            .client
            .post(self.messages_url())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request);

        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(generator = "anthropic", error = %e, "generator request failed");
            GenerationError::Upstream(e.to_string())
        })?;

        if !response.status().is_success() {
            return Err(super::upstream_error("anthropic", response).await);
        }

        let wire: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(format!("failed to parse response: {e}")))?;

        let text: String = wire
            .content
            .iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text.as_str()),
                AnthropicContentBlock::Other => None,
            })
            .collect();

        if wire.stop_reason.as_deref() == Some("max_tokens") {
            tracing::warn!(generator = "anthropic", max_tokens = self.max_tokens, "completion truncated");
        }

        if text.is_empty() {
            return Err(GenerationError::Malformed("response has no text content".to_owned()));
        }

        Ok(RawCompletion {
            text,
            model: wire.model.or_else(|| Some(self.model.clone())),
            usage: wire.usage.map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
            }),
        })
    }
}
