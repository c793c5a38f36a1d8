//! Ingestion Metrics
//!
//! Prometheus metrics for the ingestion pipeline

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::time::Duration;

static PASSES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ingestion_passes_total",
        "Total pipeline passes (completed/skipped)",
        &["status"]
    )
    .expect("Failed to register ingestion passes metric")
});

static PASS_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "ingestion_pass_duration_seconds",
        "Duration of a full pipeline pass",
        vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    )
    .expect("Failed to register ingestion pass duration metric")
});

static POSTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ingestion_posts_total",
        "Posts seen per source by outcome (fetched/hazardous/duplicate/published/publish_failed)",
        &["source", "outcome"]
    )
    .expect("Failed to register ingestion posts metric")
});

static SOURCE_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ingestion_source_failures_total",
        "Fetches that returned no posts because the source failed",
        &["source"]
    )
    .expect("Failed to register ingestion source failures metric")
});

static DEDUP_FAIL_OPEN_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ingestion_dedup_fail_open_total",
        "Dedup operations that failed and were treated as not seen",
        &["operation"]
    )
    .expect("Failed to register dedup fail-open metric")
});

static RELEASE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "ingestion_dedup_release_failures_total",
        "Claims that could not be released after a failed publish"
    )
    .expect("Failed to register dedup release failures metric")
});

/// Record pass result (completed/skipped)
pub fn record_pass(status: &str, duration: Duration) {
    PASSES_TOTAL.with_label_values(&[status]).inc();
    if status == "completed" {
        PASS_DURATION_SECONDS.observe(duration.as_secs_f64());
    }
}

/// Record posts for one source and outcome
pub fn record_posts(source: &str, outcome: &str, count: u64) {
    if count > 0 {
        POSTS_TOTAL.with_label_values(&[source, outcome]).inc_by(count);
    }
}

pub fn record_source_failure(source: &str) {
    SOURCE_FAILURES_TOTAL.with_label_values(&[source]).inc();
}

pub fn record_dedup_fail_open(operation: &str) {
    DEDUP_FAIL_OPEN_TOTAL.with_label_values(&[operation]).inc();
}

pub fn record_release_failure() {
    RELEASE_FAILURES_TOTAL.inc();
}

/// Text exposition of the default registry.
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
