use std::path::Path;

use snapcache_core::MAX_FLOAT_PRECISION;

use crate::{Config, flight::parse_duration};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::parse(&raw)
    }

    /// Parse and validate configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns an error if environment variable expansion, TOML parsing,
    /// or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if a duration is malformed, the flight policy is
    /// inconsistent, or the reconciler has nothing to reconcile from
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_flight_config()?;
        self.validate_hasher_config()?;
        self.validate_reconciler_config()?;
        self.validate_analytics_config()?;
        self.validate_telemetry_config()?;
        Ok(())
    }

    /// Validate lease, polling, and timeout durations
    fn validate_flight_config(&self) -> anyhow::Result<()> {
        let lease = self.flight.lease_duration()?;
        let poll = self.flight.poll_interval()?;
        let wait = self.flight.wait_timeout()?;
        let generator = self.flight.generator_timeout()?;

        // A lease shorter than the generator bound lets a live owner be taken over
        if lease <= generator {
            anyhow::bail!(
                "flight.lease_duration ({}) must be greater than flight.generator_timeout ({})",
                self.flight.lease_duration,
                self.flight.generator_timeout
            );
        }

        if poll.is_zero() {
            anyhow::bail!("flight.poll_interval must be greater than 0");
        }

        if poll >= wait {
            anyhow::bail!(
                "flight.poll_interval ({}) must be less than flight.wait_timeout ({})",
                self.flight.poll_interval,
                self.flight.wait_timeout
            );
        }

        Ok(())
    }

    fn validate_hasher_config(&self) -> anyhow::Result<()> {
        if self.hasher.version.is_empty() {
            anyhow::bail!("hasher.version must not be empty");
        }

        if self.hasher.float_precision > MAX_FLOAT_PRECISION {
            anyhow::bail!("hasher.float_precision exceeds maximum of {MAX_FLOAT_PRECISION}");
        }

        Ok(())
    }

    fn validate_reconciler_config(&self) -> anyhow::Result<()> {
        let interval = parse_duration("reconciler.interval", &self.reconciler.interval)?;

        // `snapcache sweep` uses the batch bounds even when the loop is disabled
        if self.reconciler.enabled || self.analytics.is_some() {
            if self.reconciler.batch_size == 0 {
                anyhow::bail!("reconciler.batch_size must be greater than 0");
            }

            if self.reconciler.concurrency == 0 {
                anyhow::bail!("reconciler.concurrency must be greater than 0");
            }
        }

        if !self.reconciler.enabled {
            return Ok(());
        }

        if interval.is_zero() {
            anyhow::bail!("reconciler.interval must be greater than 0");
        }

        if self.analytics.is_none() {
            anyhow::bail!("reconciler requires an [analytics] source to be configured");
        }

        Ok(())
    }

    fn validate_analytics_config(&self) -> anyhow::Result<()> {
        if let Some(ref analytics) = self.analytics {
            analytics.request_timeout()?;
        }

        Ok(())
    }

    fn validate_telemetry_config(&self) -> anyhow::Result<()> {
        let Some(ref telemetry) = self.telemetry else {
            return Ok(());
        };

        if !(0.0..=1.0).contains(&telemetry.sampling_rate()) {
            anyhow::bail!("telemetry.tracing.sampling_rate must be between 0.0 and 1.0");
        }

        for exporter in [telemetry.trace_exporter(), telemetry.metrics_exporter()].into_iter().flatten() {
            if exporter.export_interval()?.is_zero() {
                anyhow::bail!("telemetry exporter export_interval must be greater than 0");
            }
        }

        Ok(())
    }
}
