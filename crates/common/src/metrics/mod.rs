//! Metrics and observability utilities
//!
//! Thin wrappers over the `metrics` facade with standardized naming. A
//! recorder (the gateway installs the Prometheus exporter) must be set for
//! anything to be collected; without one every call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all RagForge metrics
pub const METRICS_PREFIX: &str = "ragforge";

/// Histogram buckets for end-to-end question latency (in seconds).
/// Completion calls dominate, so the range is wide.
pub const QUERY_BUCKETS: &[f64] = &[
    0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 30.00, 60.00, 120.0,
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Question answering
    describe_counter!(
        format!("{}_questions_total", METRICS_PREFIX),
        Unit::Count,
        "Questions processed by the retrieval core, by outcome"
    );

    describe_histogram!(
        format!("{}_question_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end question latency in seconds"
    );

    describe_histogram!(
        format!("{}_stage_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Latency of a single pipeline stage (embed, retrieve, complete)"
    );

    describe_histogram!(
        format!("{}_retrieved_chunks", METRICS_PREFIX),
        Unit::Count,
        "Number of chunks returned by the vector index per question"
    );

    // Completion
    describe_counter!(
        format!("{}_completion_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Completion responses without choices returned as raw text"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    // Ingestion
    describe_counter!(
        format!("{}_documents_indexed_total", METRICS_PREFIX),
        Unit::Count,
        "Documents written to the vector index"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record one pipeline stage
pub fn record_stage(stage: &'static str, duration_secs: f64) {
    histogram!(
        format!("{}_stage_duration_seconds", METRICS_PREFIX),
        "stage" => stage
    )
    .record(duration_secs);
}

/// Record a finished question
pub fn record_question(duration_secs: f64, outcome: &'static str, chunk_count: usize) {
    counter!(
        format!("{}_questions_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(format!("{}_question_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    if outcome == "success" {
        histogram!(format!("{}_retrieved_chunks", METRICS_PREFIX)).record(chunk_count as f64);
    }
}

/// Record a completion answered with the raw-body fallback
pub fn record_completion_fallback(model: &str) {
    counter!(
        format!("{}_completion_fallbacks_total", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .increment(1);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }

    tracing::trace!(model, batch_size, success, "Embedding request recorded");
}

/// Record documents written by the ingestion job
pub fn record_indexed(collection: &str, count: usize) {
    counter!(
        format!("{}_documents_indexed_total", METRICS_PREFIX),
        "collection" => collection.to_string()
    )
    .increment(count as u64);
}
