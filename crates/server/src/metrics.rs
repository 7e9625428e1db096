//! Prometheus metrics for the darkroom server.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping
//! and MUST be network-restricted to authorized scraper IPs at the
//! infrastructure level. Do NOT expose `/metrics` on public networks.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Cache hits, labelled by tier (`fast` / `durable`).
pub static CACHE_HITS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("darkroom_cache_hits_total", "Rendition cache hits by tier"),
        &["tier"],
    )
    .expect("metric creation failed")
});

pub static CACHE_MISSES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "darkroom_cache_misses_total",
        "Rendition cache misses (both tiers)",
    )
    .expect("metric creation failed")
});

pub static RENDITIONS_GENERATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "darkroom_renditions_generated_total",
        "Total renditions generated",
    )
    .expect("metric creation failed")
});

pub static GENERATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "darkroom_generation_duration_seconds",
            "Time taken to render one rendition",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )
    .expect("metric creation failed")
});

pub static TOKENS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "darkroom_tokens_created_total",
        "Total upload tokens issued",
    )
    .expect("metric creation failed")
});

pub static TOKENS_DENIED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "darkroom_tokens_denied_total",
        "Token requests denied because the image was already requested",
    )
    .expect("metric creation failed")
});

pub static UPLOADS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "darkroom_uploads_completed_total",
        "Total uploads persisted to the originals store",
    )
    .expect("metric creation failed")
});

pub static UPLOADS_REJECTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "darkroom_uploads_rejected_total",
            "Uploads rejected by reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so integration tests can build multiple routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(CACHE_HITS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_MISSES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RENDITIONS_GENERATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(GENERATION_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TOKENS_CREATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TOKENS_DENIED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOADS_COMPLETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOADS_REJECTED.clone()))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        register_metrics();
        register_metrics();
    }
}
