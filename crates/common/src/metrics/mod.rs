//! Metrics and observability utilities
//!
//! Prometheus metrics through the `metrics` facade with a shared
//! naming prefix. The gateway installs the exporter; the ingestion
//! binary records into whatever recorder is present (a no-op by default).

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all Paper Curator metrics
pub const METRICS_PREFIX: &str = "curator";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00,
];

/// Buckets for LLM generation, which runs much longer
pub const LLM_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Register all metric descriptions
pub fn register_metrics() {
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

    describe_counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of keyword searches"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Keyword search latency in seconds"
    );

    describe_gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of hits returned by the last search"
    );

    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total LLM generation requests"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "LLM generation latency in seconds"
    );

    describe_counter!(
        format!("{}_papers_processed_total", METRICS_PREFIX),
        Unit::Count,
        "Papers handled by the ingestion pipeline, by stage and outcome"
    );

    describe_histogram!(
        format!("{}_ingestion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Duration of a full ingestion run in seconds"
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

/// Helper to record search metrics
pub fn record_search(duration_secs: f64, result_count: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(format!("{}_search_duration_seconds", METRICS_PREFIX)).record(duration_secs);
        gauge!(format!("{}_search_results_count", METRICS_PREFIX)).set(result_count as f64);
    }
}

/// Helper to record LLM metrics
pub fn record_llm(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_llm_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}

/// Helper to record one pipeline stage for one paper.
///
/// `stage` is one of `fetched`, `downloaded`, `parsed`, `stored`, `indexed`.
pub fn record_paper_stage(stage: &'static str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_papers_processed_total", METRICS_PREFIX),
        "stage" => stage,
        "status" => status
    )
    .increment(1);
}

/// Helper to record a completed ingestion run
pub fn record_ingestion(duration_secs: f64) {
    histogram!(format!("{}_ingestion_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, LLM_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("GET", "/api/v1/papers");
        std::thread::sleep(std::time::Duration::from_millis(5));
        metrics.finish(200);
        // Just verify it runs without panic
    }

    #[test]
    fn test_pipeline_helpers_without_recorder() {
        record_paper_stage("stored", true);
        record_paper_stage("indexed", false);
        record_search(0.01, 3, true);
        record_ingestion(1.5);
    }
}
