//! Prometheus metrics for the logvault server.
//!
//! The `/metrics` endpoint is unauthenticated. Metrics carry no prefixes or
//! device tokens, only aggregate counts.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Retrieval metrics
pub static RETRIEVALS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "logvault_retrievals_total",
            "Total window retrievals by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static ARCHIVES_STREAMED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "logvault_archives_streamed_total",
        "Total archives decoded onto a response",
    )
    .expect("metric creation failed")
});

pub static BYTES_STREAMED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "logvault_bytes_streamed_total",
        "Total decompressed bytes sent to clients",
    )
    .expect("metric creation failed")
});

pub static FETCH_RETRIES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "logvault_fetch_retries_total",
        "Failed archive downloads that were retried successfully",
    )
    .expect("metric creation failed")
});

pub static RETRIEVAL_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "logvault_retrieval_duration_seconds",
            "Time from first listing request to the trailer of a retrieval",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
    )
    .expect("metric creation failed")
});

// Upload metrics
pub static UPLOADS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("logvault_uploads_total", "Total logs uploaded")
        .expect("metric creation failed")
});

pub static UPLOAD_BYTES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "logvault_upload_bytes_total",
        "Total bytes stored for uploaded logs, envelope included",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so every test router can call it.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(RETRIEVALS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ARCHIVES_STREAMED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_STREAMED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(FETCH_RETRIES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RETRIEVAL_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOADS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_BYTES.clone()))
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

/// Count a finished retrieval under `outcome`.
pub fn record_retrieval(outcome: &str) {
    RETRIEVALS.with_label_values(&[outcome]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration_is_idempotent() {
        register_metrics();
        register_metrics();
        record_retrieval("success");

        let families = REGISTRY.gather();
        assert!(
            families
                .iter()
                .any(|f| f.get_name() == "logvault_retrievals_total")
        );
    }
}
