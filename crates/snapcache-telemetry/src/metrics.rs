//! Cache metrics on the global meter
//!
//! Instruments resolve against whatever provider [`crate::init`] installed;
//! without an exporter they record into the no-op provider.

use std::sync::OnceLock;

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

pub const LOOKUP_COUNT: &str = "snapcache.lookup.count";
pub const LOOKUP_DURATION: &str = "snapcache.lookup.duration";
pub const GENERATION_DURATION: &str = "snapcache.generation.duration";
pub const RECONCILE_ROWS: &str = "snapcache.reconcile.rows";

static METER: OnceLock<Meter> = OnceLock::new();

fn meter() -> &'static Meter {
    METER.get_or_init(|| opentelemetry::global::meter("snapcache"))
}

/// Lookups by outcome (`hit`, `computed`, `waited`, `timed_out`) and source
pub fn lookup_count() -> Counter<u64> {
    meter()
        .u64_counter(LOOKUP_COUNT)
        .with_description("Cache lookups by outcome")
        .build()
}

/// End-to-end lookup latency in seconds
pub fn lookup_duration() -> Histogram<f64> {
    meter()
        .f64_histogram(LOOKUP_DURATION)
        .with_description("Cache lookup duration")
        .with_unit("s")
        .build()
}

/// Owner-side generation latency in seconds, primary and fallback
pub fn generation_duration() -> Histogram<f64> {
    meter()
        .f64_histogram(GENERATION_DURATION)
        .with_description("Commentary generation duration")
        .with_unit("s")
        .build()
}

/// Rows handled by reconciliation sweeps by result
pub fn reconcile_rows() -> Counter<u64> {
    meter()
        .u64_counter(RECONCILE_ROWS)
        .with_description("Rows handled by reconciliation sweeps")
        .build()
}

/// Record a duration measurement on a histogram
pub fn record_duration(histogram: &Histogram<f64>, elapsed: std::time::Duration, attributes: &[KeyValue]) {
    histogram.record(elapsed.as_secs_f64(), attributes);
}
