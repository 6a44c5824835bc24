//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;

use secrecy::SecretString;
use snapcache_config::{
    AnalyticsConfig, Config, FlightConfig, GeneratorConfig, GeneratorType, HealthConfig, ReconcilerConfig,
    ServerConfig,
};

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with minimal defaults and fast polling
    pub fn new() -> Self {
        Self {
            config: Config {
                server: ServerConfig {
                    listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                    health: HealthConfig {
                        enabled: true,
                        ..HealthConfig::default()
                    },
                },
                flight: FlightConfig {
                    poll_interval: "20ms".to_owned(),
                    ..FlightConfig::default()
                },
                ..Config::default()
            },
        }
    }

    /// Use an OpenAI-compatible generator pointed at a mock backend
    pub fn with_generator(mut self, base_url: &str) -> Self {
        self.config.generator = Some(GeneratorConfig {
            provider_type: GeneratorType::Openai,
            api_key: Some(SecretString::from("test-key")),
            base_url: Some(base_url.parse().expect("valid URL")),
            model: "mock-model".to_owned(),
            max_tokens: 400,
            temperature: None,
        });
        self
    }

    /// Point the reconciler's analytics source at a mock backend
    pub fn with_analytics(mut self, url: &str) -> Self {
        self.config.analytics = Some(AnalyticsConfig {
            url: url.parse().expect("valid URL"),
            api_key: None,
            timeout: "2s".to_owned(),
        });
        self
    }

    /// Run the reconciler loop on a short interval
    pub fn with_reconciler(mut self, interval: &str) -> Self {
        self.config.reconciler = ReconcilerConfig {
            enabled: true,
            interval: interval.to_owned(),
            ..ReconcilerConfig::default()
        };
        self
    }

    /// Override the waiter and generator bounds
    pub fn with_timeouts(mut self, wait_timeout: &str, generator_timeout: &str) -> Self {
        self.config.flight.wait_timeout = wait_timeout.to_owned();
        self.config.flight.generator_timeout = generator_timeout.to_owned();
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config.validate().expect("test config must be valid");
        self.config
    }
}
