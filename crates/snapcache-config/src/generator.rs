use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// External text generator configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Provider protocol type
    #[serde(rename = "type")]
    pub provider_type: GeneratorType,
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Model identifier sent to the provider
    pub model: String,
    /// Upper bound on generated tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f64>,
}

/// Supported generator protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorType {
    /// OpenAI-compatible chat completions
    Openai,
    /// Anthropic Messages API
    Anthropic,
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_tokens() -> u32 {
    800
}
