//! OpenAI-compatible chat completions generator

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use snapcache_config::GeneratorConfig;
use snapcache_core::{GenerationError, TokenUsage};
use url::Url;

use super::{Generator, RawCompletion};
use crate::prompt::Prompt;
use crate::protocol::openai::{OpenAiMessage, OpenAiRequest, OpenAiResponse, ResponseFormat};

/// Default `OpenAI` API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible generator
pub struct OpenAiGenerator {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    model: String,
    max_tokens: u32,
    temperature: Option<f64>,
}

impl OpenAiGenerator {
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

    /// Build the chat completions URL
    fn completions_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<RawCompletion, GenerationError> {
        let request = OpenAiRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAiMessage {
                    role: "system".to_owned(),
                    content: Some(prompt.system.clone()),
                },
                OpenAiMessage {
                    role: "user".to_owned(),
                    content: Some(prompt.user.clone()),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let mut builder = self.client.post(self.completions_url()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(generator = "openai", error = %e, "generator request failed");
            GenerationError::Upstream(e.to_string())
        })?;

        if !response.status().is_success() {
            return Err(super::upstream_error("openai", response).await);
        }

        let wire: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(format!("failed to parse response: {e}")))?;

        let choice = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::Malformed("response has no choices".to_owned()))?;

        if choice.finish_reason.as_deref() == Some("length") {
            tracing::warn!(generator = "openai", max_tokens = self.max_tokens, "completion truncated");
        }

        let text = choice
            .message
            .content
            .ok_or_else(|| GenerationError::Malformed("response has no message content".to_owned()))?;

        Ok(RawCompletion {
            text,
            model: wire.model.or_else(|| Some(self.model.clone())),
            usage: wire.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
        })
    }
}
