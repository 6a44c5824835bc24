use std::time::Duration;

use serde::Deserialize;

/// Single-flight policy
///
/// Durations are human-readable strings (`"90s"`, `"5m"`, `"250ms"`).
/// `lease_duration` must exceed the generator's worst-case latency or live
/// computations will be taken over.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlightConfig {
    /// How long an owner may hold a key in COMPUTING before takeover
    #[serde(default = "default_lease_duration")]
    pub lease_duration: String,
    /// Delay between store reads while waiting on another owner
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    /// Longest a losing caller waits before answering with what is available
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout: String,
    /// Bound on one generator call
    #[serde(default = "default_generator_timeout")]
    pub generator_timeout: String,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            lease_duration: default_lease_duration(),
            poll_interval: default_poll_interval(),
            wait_timeout: default_wait_timeout(),
            generator_timeout: default_generator_timeout(),
        }
    }
}

impl FlightConfig {
    /// Parsed `lease_duration`
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a valid duration string
    pub fn lease_duration(&self) -> anyhow::Result<Duration> {
        parse_duration("flight.lease_duration", &self.lease_duration)
    }

    /// Parsed `poll_interval`
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a valid duration string
    pub fn poll_interval(&self) -> anyhow::Result<Duration> {
        parse_duration("flight.poll_interval", &self.poll_interval)
    }

    /// Parsed `wait_timeout`
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a valid duration string
    pub fn wait_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration("flight.wait_timeout", &self.wait_timeout)
    }

    /// Parsed `generator_timeout`
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a valid duration string
    pub fn generator_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration("flight.generator_timeout", &self.generator_timeout)
    }
}

/// Parse a duration string, naming the field on failure
///
/// # Errors
///
/// Returns an error if `value` is not a valid duration string
pub fn parse_duration(field: &str, value: &str) -> anyhow::Result<Duration> {
    duration_str::parse(value).map_err(|e| anyhow::anyhow!("invalid duration for {field} '{value}': {e}"))
}

fn default_lease_duration() -> String {
    "5m".to_owned()
}

fn default_poll_interval() -> String {
    "250ms".to_owned()
}

fn default_wait_timeout() -> String {
    "10s".to_owned()
}

fn default_generator_timeout() -> String {
    "90s".to_owned()
}
