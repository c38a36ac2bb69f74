//! Metrics collection for airdrop execution
//!
//! Prometheus metrics for sessions, batches and individual transfers.

use std::time::Instant;

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, Encoder, HistogramVec,
    IntCounterVec, IntGaugeVec, TextEncoder,
};

use crate::batch::Outcome;

lazy_static! {
    /// Sessions by terminal status
    static ref SESSIONS: IntCounterVec = register_int_counter_vec!(
        "airdrop_sessions_total",
        "Total number of airdrop sessions",
        &["asset", "status"]
    ).unwrap();

    /// Transfers by outcome
    static ref TRANSFERS: IntCounterVec = register_int_counter_vec!(
        "airdrop_transfers_total",
        "Total number of recorded transfers",
        &["asset", "outcome"]
    ).unwrap();

    /// Batches by outcome
    static ref BATCHES: IntCounterVec = register_int_counter_vec!(
        "airdrop_batches_total",
        "Total number of submitted batches",
        &["asset", "outcome"]
    ).unwrap();

    /// Time from checkpoint fetch to confirmation
    static ref BATCH_DURATION: HistogramVec = register_histogram_vec!(
        "airdrop_batch_submission_seconds",
        "Batch submission duration in seconds",
        &["asset"],
        vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    static ref ACTIVE_SESSIONS: IntGaugeVec = register_int_gauge_vec!(
        "airdrop_active_sessions",
        "Number of airdrop sessions currently running",
        &["asset"]
    ).unwrap();
}

/// Metrics collector scoped to one asset
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    asset: String,
}

impl MetricsCollector {
    /// Create a collector labelled with the asset symbol
    pub fn new(asset: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
        }
    }

    /// Record a session entering the batch loop
    pub fn record_session_start(&self) {
        ACTIVE_SESSIONS.with_label_values(&[&self.asset]).inc();
    }

    /// Record a session reaching a terminal status
    pub fn record_session_end(&self, status: &str) {
        ACTIVE_SESSIONS.with_label_values(&[&self.asset]).dec();
        SESSIONS.with_label_values(&[&self.asset, status]).inc();
    }

    /// Sessions of this asset currently running
    pub fn active_sessions(&self) -> i64 {
        ACTIVE_SESSIONS.with_label_values(&[&self.asset]).get()
    }

    /// Session refused before any transfer was attempted
    pub fn record_session_rejected(&self) {
        SESSIONS.with_label_values(&[&self.asset, "rejected"]).inc();
    }

    /// Record one transfer result
    pub fn record_transfer(&self, outcome: Outcome) {
        TRANSFERS
            .with_label_values(&[&self.asset, outcome.as_str()])
            .inc();
    }

    /// Record a settled batch and its submission latency
    pub fn record_batch(&self, outcome: &str, duration_secs: f64) {
        BATCHES.with_label_values(&[&self.asset, outcome]).inc();
        BATCH_DURATION
            .with_label_values(&[&self.asset])
            .observe(duration_secs);
    }
}

/// Timer for measuring batch submission latency
pub struct Timer {
    start: Instant,
}

impl Timer {
    #[inline]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    #[inline]
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Export metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert metrics to UTF-8: {}", e).into())
}
