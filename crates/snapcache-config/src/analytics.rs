use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Analytics provider reached over HTTP
///
/// Snapshots are fetched from `{url}/analytics/{subject_id}/{context_id}`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyticsConfig {
    /// Base URL of the analytics service
    pub url: Url,
    /// Bearer token, if the service requires one
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Request timeout
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

impl AnalyticsConfig {
    /// Parsed `timeout`
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a valid duration string
    pub fn request_timeout(&self) -> anyhow::Result<Duration> {
        crate::parse_duration("analytics.timeout", &self.timeout)
    }
}

fn default_timeout() -> String {
    "10s".to_owned()
}
