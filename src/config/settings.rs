//! # Broker Settings
//!
//! Process-level settings: STS session behaviour and observability. Loaded
//! from an optional TOML file layered under `STS_BROKER__*` environment
//! variables (e.g. `STS_BROKER__REQUEST_TIMEOUT_SECONDS=10`,
//! `STS_BROKER__OBSERVABILITY__LOG_LEVEL=debug`).

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::errors::ConfigError;
use crate::sts::{StsClientConfig, DEFAULT_REQUEST_TIMEOUT_SECONDS, DEFAULT_STS_PATH};

/// Environment variable prefix for settings overrides.
pub const ENV_PREFIX: &str = "STS_BROKER";

/// Main broker configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BrokerSettings {
    /// Bound on one STS round trip, in seconds
    #[validate(range(min = 1, max = 300, message = "Timeout must be between 1 and 300 seconds"))]
    pub request_timeout_seconds: u64,

    /// Skip verification of the STS server certificate. Explicit opt-in only.
    pub insecure_skip_verify: bool,

    /// STS service path used when the configured URL has none
    #[validate(custom(function = "validate_sts_path", message = "STS path must start with '/'"))]
    pub sts_path: String,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            insecure_skip_verify: false,
            sts_path: DEFAULT_STS_PATH.to_string(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl BrokerSettings {
    /// Load settings from `path` (if given) and the environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        let settings: BrokerSettings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Session options for the STS client.
    pub fn sts_client_config(&self) -> StsClientConfig {
        StsClientConfig {
            request_timeout: self.request_timeout(),
            insecure_skip_verify: self.insecure_skip_verify,
            sts_path: self.sts_path.clone(),
        }
    }
}

fn validate_sts_path(path: &str) -> Result<(), ValidationError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_sts_path"))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing service name
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "sts-broker".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}
