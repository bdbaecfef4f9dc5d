//! Prometheus registry and the HTTP metrics of the status endpoint.
//!
//! Ingestion, extraction, upstream and provider metrics live in
//! `streamvault_core::metrics`; this module registers them next to the
//! HTTP metrics and renders the text exposition format.

use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "streamvault_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("streamvault_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();

    for metric in streamvault_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Label for a request path. Unknown paths collapse into one series.
pub fn path_label(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/metrics" => "/metrics",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamvault_core::metrics::{INGEST_OUTCOMES, QUEUE_DEPTH};

    #[test]
    fn test_encode_metrics_includes_core_metrics() {
        INGEST_OUTCOMES.with_label_values(&["movie", "insert"]).inc();
        QUEUE_DEPTH.with_label_values(&["movie"]).set(0);
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/health", "200"])
            .inc();

        let output = encode_metrics().unwrap();
        assert!(output.contains("streamvault_ingest_outcomes_total"));
        assert!(output.contains("streamvault_queue_depth"));
        assert!(output.contains("streamvault_http_requests_total"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_path_label() {
        assert_eq!(path_label("/health"), "/health");
        assert_eq!(path_label("/metrics"), "/metrics");
        assert_eq!(path_label("/anything/else"), "other");
    }
}
