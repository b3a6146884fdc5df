//! # Observability Infrastructure
//!
//! Structured logging through `tracing` and issuance metrics through the
//! `metrics` facade.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_config_info};
pub use metrics::MetricsRecorder;

use crate::config::ObservabilityConfig;
use ::tracing::info;

/// Install logging and describe broker metrics.
///
/// Returns the recorder the token pipeline should report through.
pub fn init_observability(
    config: &ObservabilityConfig,
) -> Result<MetricsRecorder, tracing_subscriber::util::TryInitError> {
    init_logging(config)?;

    let recorder = MetricsRecorder::new();
    recorder.register_broker_metrics();

    info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        json_logging = config.json_logging,
        "Observability initialized successfully"
    );

    Ok(recorder)
}
