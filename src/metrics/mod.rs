//! Prometheus metrics for the gale pipeline
//!
//! This module provides metrics tracking for:
//! - Ingestion: fetch outcomes, source outcomes, inserted articles, crawl duration
//! - Deduplication: cluster assignments and merges
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec, Encoder,
    HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

/// Container for all pipeline metrics
struct PipelineMetrics {
    fetch_outcomes: CounterVec,
    source_outcomes: CounterVec,
    articles_inserted: CounterVec,
    crawl_duration: HistogramVec,
    cluster_assignments: Counter,
    cluster_merges: Counter,
}

static PIPELINE_METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, errors are logged and subsequent
/// metric operations become no-ops.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = PipelineMetrics {
        fetch_outcomes: register_counter_vec!(
            "gale_fetch_outcomes_total",
            "Fetch outcomes by publisher and status code or error kind",
            &["publisher", "outcome"]
        )?,
        source_outcomes: register_counter_vec!(
            "gale_source_outcomes_total",
            "Per-source crawl outcomes (success/skipped/failed)",
            &["publisher", "outcome"]
        )?,
        articles_inserted: register_counter_vec!(
            "gale_articles_inserted_total",
            "Newly inserted articles per publisher",
            &["publisher"]
        )?,
        crawl_duration: register_histogram_vec!(
            "gale_crawl_duration_seconds",
            "Time spent crawling one source in seconds",
            &["publisher"],
            vec![0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
        )?,
        cluster_assignments: register_counter!(
            "gale_dedup_assignments_total",
            "Articles whose cluster assignment changed during dedup"
        )?,
        cluster_merges: register_counter!(
            "gale_dedup_cluster_merges_total",
            "Wholesale cluster merges performed during dedup"
        )?,
    };

    PIPELINE_METRICS
        .set(metrics)
        .map_err(|_| "Pipeline metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    PIPELINE_METRICS.get().is_some()
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record fetch outcomes (status code or error kind) for a publisher
pub fn record_fetch_outcomes(publisher: &str, outcome: &str, count: u64) {
    if count == 0 {
        return;
    }
    if let Some(m) = PIPELINE_METRICS.get() {
        m.fetch_outcomes
            .with_label_values(&[publisher, outcome])
            .inc_by(count as f64);
    }
}

/// Record a source-level crawl outcome
pub fn record_source_outcome(publisher: &str, outcome: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.source_outcomes
            .with_label_values(&[publisher, outcome])
            .inc();
    }
}

/// Record newly inserted articles for a publisher
pub fn record_articles_inserted(publisher: &str, count: u64) {
    if count == 0 {
        return;
    }
    if let Some(m) = PIPELINE_METRICS.get() {
        m.articles_inserted
            .with_label_values(&[publisher])
            .inc_by(count as f64);
    }
}

/// Record dedup results for one invocation
pub fn record_dedup_results(assignments: u64, merges: u64) {
    let Some(m) = PIPELINE_METRICS.get() else {
        return;
    };

    if assignments > 0 {
        m.cluster_assignments.inc_by(assignments as f64);
    }
    if merges > 0 {
        m.cluster_merges.inc_by(merges as f64);
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a per-source crawl timer (returns a timer handle)
pub fn start_crawl_timer(publisher: &str) -> MetricsTimer {
    match PIPELINE_METRICS.get() {
        Some(m) => MetricsTimer::new(
            m.crawl_duration
                .with_label_values(&[publisher])
                .start_timer(),
        ),
        None => MetricsTimer::noop(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        let _ = init_metrics();
    }

    #[test]
    fn test_init_metrics_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_encode_metrics() {
        ensure_metrics_initialized();
        let text = encode_metrics().unwrap();
        assert!(text.contains("gale_") || text.is_empty());
    }

    #[test]
    fn test_recording_does_not_panic() {
        ensure_metrics_initialized();
        record_fetch_outcomes("ap_news", "200", 3);
        record_fetch_outcomes("ap_news", "timeout", 1);
        record_source_outcome("ap_news", "success");
        record_articles_inserted("ap_news", 12);
        record_dedup_results(5, 1);
        let _timer = start_crawl_timer("ap_news");
    }

    #[test]
    fn test_zero_counts_are_noops() {
        ensure_metrics_initialized();
        record_articles_inserted("reuters", 0);
        record_fetch_outcomes("reuters", "200", 0);
        record_dedup_results(0, 0);
    }
}
