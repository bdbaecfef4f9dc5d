//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Ingestion pipelines (outcomes, worker failures, queue depth)
//! - Metadata extraction errors
//! - Upstream fetches, cache lookups and rate limiting
//! - Debrid provider errors by category

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts};

// =============================================================================
// Ingestion Metrics
// =============================================================================

/// Items processed by pipeline and outcome.
pub static INGEST_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamvault_ingest_outcomes_total",
            "Scraped items processed, by pipeline and outcome",
        ),
        &["pipeline", "outcome"], // "insert", "replace", "skip", "deferred", "dropped"
    )
    .unwrap()
});

/// Items whose processing failed at the worker boundary.
pub static INGEST_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamvault_ingest_failures_total",
            "Items that failed with an error or panic inside the worker",
        ),
        &["pipeline", "kind"], // kind: "error", "panic"
    )
    .unwrap()
});

/// Items buffered but not yet processed.
pub static QUEUE_DEPTH: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("streamvault_queue_depth", "Items waiting in a pipeline queue"),
        &["pipeline"],
    )
    .unwrap()
});

/// Per-item processing time.
pub static INGEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "streamvault_ingest_duration_seconds",
            "Time spent processing one scraped item",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        &["pipeline"],
    )
    .unwrap()
});

// =============================================================================
// Extraction Metrics
// =============================================================================

/// Non-fatal extraction errors.
pub static EXTRACTION_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamvault_extraction_errors_total",
            "Metadata extraction errors by kind",
        ),
        &["kind"], // "title", "magnet", "torrent", "content_type", "fetch"
    )
    .unwrap()
});

// =============================================================================
// Upstream Metrics
// =============================================================================

/// Upstream fetches by result.
pub static UPSTREAM_FETCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamvault_upstream_fetches_total",
            "Upstream fetches issued through a rate limited cache",
        ),
        &["upstream", "result"], // result: "success", "error", "timeout"
    )
    .unwrap()
});

/// Cache lookups by result.
pub static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("streamvault_cache_lookups_total", "Cache lookups by result"),
        &["cache", "result"], // "hit", "miss", "coalesced"
    )
    .unwrap()
});

/// Calls that had to wait for a rate limit window.
pub static RATE_LIMIT_WAITS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamvault_rate_limit_waits_total",
            "Calls delayed by a rate limiter",
        ),
        &["upstream"],
    )
    .unwrap()
});

// =============================================================================
// Provider Metrics
// =============================================================================

/// Normalized provider errors.
pub static PROVIDER_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamvault_provider_errors_total",
            "Debrid provider errors by normalized category",
        ),
        &["provider", "category"],
    )
    .unwrap()
});

/// Provider requests by operation and status.
pub static PROVIDER_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamvault_provider_requests_total",
            "Requests sent to debrid providers",
        ),
        &["provider", "status"], // status: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Ingestion
        Box::new(INGEST_OUTCOMES.clone()),
        Box::new(INGEST_FAILURES.clone()),
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(INGEST_DURATION.clone()),
        // Extraction
        Box::new(EXTRACTION_ERRORS.clone()),
        // Upstream
        Box::new(UPSTREAM_FETCHES.clone()),
        Box::new(CACHE_LOOKUPS.clone()),
        Box::new(RATE_LIMIT_WAITS.clone()),
        // Providers
        Box::new(PROVIDER_ERRORS.clone()),
        Box::new(PROVIDER_REQUESTS.clone()),
    ]
}
