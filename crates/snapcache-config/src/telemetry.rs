//! Log output and OTLP export settings

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

/// Telemetry configuration
///
/// Logs always go to stdout. Spans and metrics are exported only when an
/// exporter is configured, either shared through `exporter` or per signal.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// `service.name` resource attribute
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Extra resource attributes
    #[serde(default)]
    pub resource_attributes: HashMap<String, String>,
    /// Stdout log encoding
    #[serde(default)]
    pub log_format: LogFormat,
    /// Exporter shared by traces and metrics
    #[serde(default)]
    pub exporter: Option<ExporterConfig>,
    #[serde(default)]
    pub tracing: Option<TracingConfig>,
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

impl TelemetryConfig {
    /// Exporter for spans, falling back to the shared one
    pub fn trace_exporter(&self) -> Option<&ExporterConfig> {
        self.tracing
            .as_ref()
            .and_then(|t| t.exporter.as_ref())
            .or(self.exporter.as_ref())
    }

    /// Exporter for metrics, falling back to the shared one
    pub fn metrics_exporter(&self) -> Option<&ExporterConfig> {
        self.metrics
            .as_ref()
            .and_then(|m| m.exporter.as_ref())
            .or(self.exporter.as_ref())
    }

    /// Trace sampling ratio; everything is sampled by default
    pub fn sampling_rate(&self) -> f64 {
        self.tracing.as_ref().map_or(1.0, |t| t.sampling_rate)
    }

    /// Whether sampling follows the parent span's decision
    pub fn parent_based(&self) -> bool {
        self.tracing.as_ref().is_none_or(|t| t.parent_based)
    }
}

/// Stdout log encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// OTLP exporter
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    pub endpoint: Url,
    #[serde(default)]
    pub protocol: ExportProtocol,
    /// How often metrics are pushed
    #[serde(default = "default_export_interval")]
    pub export_interval: String,
}

impl ExporterConfig {
    /// Parsed `export_interval`
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a valid duration string
    pub fn export_interval(&self) -> anyhow::Result<Duration> {
        crate::parse_duration("telemetry.exporter.export_interval", &self.export_interval)
    }
}

/// OTLP transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportProtocol {
    #[default]
    Grpc,
    HttpProto,
}

/// Span export settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TracingConfig {
    /// Fraction of root spans sampled, 0.0 to 1.0
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
    #[serde(default = "default_parent_based")]
    pub parent_based: bool,
    #[serde(default)]
    pub exporter: Option<ExporterConfig>,
}

/// Metric export settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub exporter: Option<ExporterConfig>,
}

fn default_service_name() -> String {
    "snapcache".to_owned()
}

fn default_export_interval() -> String {
    "30s".to_owned()
}

#[allow(clippy::missing_const_for_fn)]
fn default_sampling_rate() -> f64 {
    1.0
}

#[allow(clippy::missing_const_for_fn)]
fn default_parent_based() -> bool {
    true
}
