//! Prometheus metrics for the layergroup server.
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no tokens, SQL or template names, only aggregate counts.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Layergroup cache metrics
pub static LAYERGROUPS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "layergroup_created_total",
        "Total number of configurations inserted into the cache",
    )
    .expect("metric creation failed")
});

pub static CACHE_HITS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "layergroup_cache_hits_total",
        "Total number of submissions answered by an existing cache entry",
    )
    .expect("metric creation failed")
});

pub static COALESCED_CREATES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "layergroup_coalesced_creates_total",
        "Total number of submissions that waited on a concurrent creation",
    )
    .expect("metric creation failed")
});

pub static VALIDATION_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "layergroup_validation_failures_total",
        "Total number of configurations rejected by option validation",
    )
    .expect("metric creation failed")
});

// Attribute and template metrics
pub static ATTRIBUTE_LOOKUPS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "layergroup_attribute_lookups_total",
            "Total number of attribute lookups by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static TEMPLATE_INSTANTIATIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "layergroup_template_instantiations_total",
        "Total number of successful named template instantiations",
    )
    .expect("metric creation failed")
});

pub static CACHE_ENTRIES_PURGED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "layergroup_cache_entries_purged_total",
        "Total number of cache entries removed by the TTL sweeper",
    )
    .expect("metric creation failed")
});

// Timing metrics
pub static QUERY_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "layergroup_query_duration_seconds",
            "Time taken by read-only layer queries",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so integration tests can build several routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(LAYERGROUPS_CREATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_HITS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(COALESCED_CREATES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(VALIDATION_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ATTRIBUTE_LOOKUPS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TEMPLATE_INSTANTIATIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_ENTRIES_PURGED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(QUERY_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record an attribute lookup outcome.
pub fn record_attribute_lookup(outcome: &str) {
    ATTRIBUTE_LOOKUPS.with_label_values(&[outcome]).inc();
}
