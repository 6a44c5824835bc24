//! Logging, tracing, and metrics setup for snapcache
//!
//! Logs always go to stdout through `tracing-subscriber`. When `[telemetry]`
//! names an OTLP exporter, spans and the cache instruments in [`metrics`]
//! are exported as well.

mod metadata;
pub mod metrics;

use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use snapcache_config::TelemetryConfig;
use snapcache_config::telemetry::{ExportProtocol, ExporterConfig, LogFormat};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub use opentelemetry::KeyValue;

/// Keeps the export pipelines alive; shuts them down on drop
#[must_use = "dropping the guard stops telemetry export"]
pub struct TelemetryGuard {
    meter_provider: Option<SdkMeterProvider>,
    tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Push buffered spans and metrics now
    ///
    /// # Errors
    ///
    /// Returns an error if either provider fails to flush
    pub fn force_flush(&self) -> anyhow::Result<()> {
        if let Some(provider) = &self.meter_provider {
            provider
                .force_flush()
                .map_err(|e| anyhow::anyhow!("failed to flush metrics: {e}"))?;
        }
        if let Some(provider) = &self.tracer_provider {
            provider
                .force_flush()
                .map_err(|e| anyhow::anyhow!("failed to flush spans: {e}"))?;
        }
        Ok(())
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        // The subscriber may already be gone, so report straight to stderr
        if let Some(Err(e)) = self.meter_provider.take().map(|p| p.shutdown()) {
            eprintln!("failed to shut down meter provider: {e}");
        }
        if let Some(Err(e)) = self.tracer_provider.take().map(|p| p.shutdown()) {
            eprintln!("failed to shut down tracer provider: {e}");
        }
    }
}

/// Install the global subscriber and any configured OTLP pipelines
///
/// `RUST_LOG` takes precedence over `default_filter`. Hold the returned
/// guard for the lifetime of the process.
///
/// # Errors
///
/// Returns an error if an exporter cannot be built or a subscriber is
/// already installed
pub fn init(config: Option<&TelemetryConfig>, default_filter: &str) -> anyhow::Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json = config.is_some_and(|c| c.log_format == LogFormat::Json);
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_target(true));
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().with_current_span(true));

    let resource = config.map(metadata::build_resource);

    let meter_provider = match (config.and_then(TelemetryConfig::metrics_exporter), &resource) {
        (Some(exporter), Some(resource)) => Some(meter_provider(exporter, resource.clone())?),
        _ => None,
    };
    let tracer_provider = match (config, &resource) {
        (Some(config), Some(resource)) if config.trace_exporter().is_some() => {
            Some(tracer_provider(config, resource.clone())?)
        }
        _ => None,
    };

    if let Some(provider) = &meter_provider {
        global::set_meter_provider(provider.clone());
    }
    let otel_layer = tracer_provider.as_ref().map(|provider| {
        global::set_tracer_provider(provider.clone());
        tracing_opentelemetry::layer().with_tracer(provider.tracer("snapcache"))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(otel_layer)
        .try_init()?;

    Ok(TelemetryGuard {
        meter_provider,
        tracer_provider,
    })
}

fn meter_provider(exporter: &ExporterConfig, resource: Resource) -> anyhow::Result<SdkMeterProvider> {
    let builder = opentelemetry_otlp::MetricExporter::builder();
    let metric_exporter = match exporter.protocol {
        ExportProtocol::Grpc => builder.with_tonic().with_endpoint(exporter.endpoint.as_str()).build(),
        ExportProtocol::HttpProto => builder.with_http().with_endpoint(exporter.endpoint.as_str()).build(),
    }
    .map_err(|e| anyhow::anyhow!("failed to build metrics exporter for {}: {e}", exporter.endpoint))?;

    let reader = PeriodicReader::builder(metric_exporter)
        .with_interval(exporter.export_interval()?)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build())
}

fn tracer_provider(config: &TelemetryConfig, resource: Resource) -> anyhow::Result<SdkTracerProvider> {
    let exporter = config
        .trace_exporter()
        .ok_or_else(|| anyhow::anyhow!("no trace exporter configured"))?;

    let builder = opentelemetry_otlp::SpanExporter::builder();
    let span_exporter = match exporter.protocol {
        ExportProtocol::Grpc => builder.with_tonic().with_endpoint(exporter.endpoint.as_str()).build(),
        ExportProtocol::HttpProto => builder.with_http().with_endpoint(exporter.endpoint.as_str()).build(),
    }
    .map_err(|e| anyhow::anyhow!("failed to build span exporter for {}: {e}", exporter.endpoint))?;

    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(sampler(config.sampling_rate(), config.parent_based()))
        .with_batch_exporter(span_exporter)
        .build())
}

fn sampler(rate: f64, parent_based: bool) -> Sampler {
    let root = match rate {
        r if r >= 1.0 => Sampler::AlwaysOn,
        r if r <= 0.0 => Sampler::AlwaysOff,
        r => Sampler::TraceIdRatioBased(r),
    };

    if parent_based {
        Sampler::ParentBased(Box::new(root))
    } else {
        root
    }
}
