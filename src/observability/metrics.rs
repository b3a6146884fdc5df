//! # Metrics Collection
//!
//! Issuance counters and timings emitted through the `metrics` facade. The
//! library installs no exporter; whichever recorder the host process installs
//! receives them.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

pub const FORGE_TOTAL: &str = "sts_broker_forge_total";
pub const FORGE_DURATION: &str = "sts_broker_forge_duration_seconds";
pub const EXCHANGE_TOTAL: &str = "sts_broker_exchange_total";
pub const EXCHANGE_DURATION: &str = "sts_broker_exchange_duration_seconds";
pub const TOKEN_READS_TOTAL: &str = "sts_broker_token_reads_total";

/// Outcome labels used for token reads: success plus one per failing stage.
pub const TOKEN_READ_STATUSES: &[&str] = &["success", "config", "forge", "exchange", "package"];

/// Metrics recorder that tracks token issuance
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Record one certificate forge and how long key generation plus signing took
    pub fn record_forge(&self, success: bool, duration: f64) {
        counter!(FORGE_TOTAL, "status" => status_label(success)).increment(1);
        histogram!(FORGE_DURATION).record(duration);
    }

    /// Record one STS round trip
    pub fn record_exchange(&self, success: bool, duration: f64) {
        counter!(EXCHANGE_TOTAL, "status" => status_label(success)).increment(1);
        histogram!(EXCHANGE_DURATION).record(duration);
    }

    /// Record the outcome of a whole token read
    pub fn record_token_read(&self, status: &'static str) {
        counter!(TOKEN_READS_TOTAL, "status" => status).increment(1);
    }

    /// Describe broker metrics and zero the counters so exports appear before
    /// the first read.
    pub fn register_broker_metrics(&self) {
        describe_counter!(FORGE_TOTAL, Unit::Count, "Client certificates forged, by outcome");
        describe_histogram!(FORGE_DURATION, Unit::Seconds, "Time spent forging a certificate");
        describe_counter!(EXCHANGE_TOTAL, Unit::Count, "STS token exchanges, by outcome");
        describe_histogram!(EXCHANGE_DURATION, Unit::Seconds, "STS round-trip duration");
        describe_counter!(
            TOKEN_READS_TOTAL,
            Unit::Count,
            "Token reads grouped by outcome or failing stage"
        );

        for status in ["success", "error"] {
            counter!(FORGE_TOTAL, "status" => status).absolute(0);
            counter!(EXCHANGE_TOTAL, "status" => status).absolute(0);
        }
        for status in TOKEN_READ_STATUSES {
            counter!(TOKEN_READS_TOTAL, "status" => *status).absolute(0);
        }
    }
}

fn status_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}
