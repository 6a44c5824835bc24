use std::time::Duration;

use snapcache_config::FlightConfig;

/// Lease, polling, and timeout bounds for one orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlightPolicy {
    /// How long an owner may hold COMPUTING before takeover
    pub lease: Duration,
    /// Delay between store reads while waiting
    pub poll_interval: Duration,
    /// Longest a losing caller is kept waiting
    pub wait_timeout: Duration,
    /// Bound on one generator call
    pub generator_timeout: Duration,
}

impl Default for FlightPolicy {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(300),
            poll_interval: Duration::from_millis(250),
            wait_timeout: Duration::from_secs(10),
            generator_timeout: Duration::from_secs(90),
        }
    }
}

impl TryFrom<&FlightConfig> for FlightPolicy {
    type Error = anyhow::Error;

    fn try_from(config: &FlightConfig) -> anyhow::Result<Self> {
        Ok(Self {
            lease: config.lease_duration()?,
            poll_interval: config.poll_interval()?,
            wait_timeout: config.wait_timeout()?,
            generator_timeout: config.generator_timeout()?,
        })
    }
}
