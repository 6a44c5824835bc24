//! HTTP client for the analytics service

use async_trait::async_trait;
use http::StatusCode;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use snapcache_config::AnalyticsConfig;
use snapcache_core::{AnalyticsError, AnalyticsProvider, AnalyticsSnapshot};
use url::Url;

/// Fetches analytics from `{url}/analytics/{subject_id}/{context_id}`
#[derive(Debug, Clone)]
pub struct HttpAnalytics {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
}

impl HttpAnalytics {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is invalid or the HTTP client cannot be built
    pub fn new(config: &AnalyticsConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.request_timeout()?).build()?;

        Ok(Self {
            client,
            base_url: config.url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn snapshot_url(&self, subject_id: &str, context_id: &str) -> Result<Url, AnalyticsError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| AnalyticsError::Unavailable(format!("cannot build analytics URL from {}", self.base_url)))?
            .pop_if_empty()
            .extend(["analytics", subject_id, context_id]);
        Ok(url)
    }
}

#[async_trait]
impl AnalyticsProvider for HttpAnalytics {
    async fn analytics(&self, subject_id: &str, context_id: &str) -> Result<AnalyticsSnapshot, AnalyticsError> {
        let url = self.snapshot_url(subject_id, context_id)?;

        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(subject_id, context_id, error = %e, "analytics request failed");
            AnalyticsError::Unavailable(e.to_string())
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(AnalyticsError::NotFound {
                subject_id: subject_id.to_owned(),
                context_id: context_id.to_owned(),
            }),
            status if !status.is_success() => Err(AnalyticsError::Unavailable(format!(
                "analytics service returned {status}"
            ))),
            _ => response
                .json::<serde_json::Value>()
                .await
                .map(AnalyticsSnapshot::new)
                .map_err(|e| AnalyticsError::Unavailable(format!("failed to parse analytics: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(url: &str, api_key: Option<&str>) -> HttpAnalytics {
        HttpAnalytics::new(&AnalyticsConfig {
            url: Url::parse(url).unwrap(),
            api_key: api_key.map(|k| SecretString::from(k.to_owned())),
            timeout: "2s".to_owned(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_snapshot_with_bearer_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/analytics/E1/S%201"))
            .and(header("authorization", "Bearer analytics-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"score": 72})))
            .expect(1)
            .mount(&server)
            .await;

        let analytics = client(&format!("{}/api/", server.uri()), Some("analytics-key"))
            .analytics("E1", "S 1")
            .await
            .unwrap();

        assert_eq!(analytics.number("score"), Some(72.0));
    }

    #[tokio::test]
    async fn missing_analytics_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server.uri(), None).analytics("E1", "S1").await.unwrap_err();

        assert!(matches!(err, AnalyticsError::NotFound { ref subject_id, .. } if subject_id == "E1"));
    }

    #[tokio::test]
    async fn server_errors_are_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = client(&server.uri(), None).analytics("E1", "S1").await.unwrap_err();

        assert!(matches!(err, AnalyticsError::Unavailable(ref msg) if msg.contains("502")));
    }
}
