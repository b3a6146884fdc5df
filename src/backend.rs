//! # Token Backend
//!
//! One token read runs the whole pipeline: load configuration, forge a fresh
//! client identity, exchange it at the STS, and package the result. Every
//! read starts from scratch; nothing is cached or reused between reads.
//!
//! Callers of [`TokenBackend::read_token`] only ever see
//! [`TokenAcquisitionError`]. The underlying cause is logged and counted.

use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::config::{
    BrokerSettings, ConfigProvider, ConfigStorage, ConfigStore, ConfigUpdate, ConfigView,
    WriteMode,
};
use crate::errors::{ConfigError, CryptoError, Result, TokenAcquisitionError};
use crate::forge;
use crate::observability::MetricsRecorder;
use crate::packager::{self, PackagedResponse};
use crate::sts::{self, StsClientConfig};

/// Token pipeline over a configuration provider.
#[derive(Debug, Clone)]
pub struct TokenBackend<P> {
    provider: P,
    client_config: StsClientConfig,
    metrics: MetricsRecorder,
}

impl<P: ConfigProvider> TokenBackend<P> {
    pub fn new(provider: P, settings: &BrokerSettings) -> Self {
        Self::with_client_config(provider, settings.sts_client_config())
    }

    pub fn with_client_config(provider: P, client_config: StsClientConfig) -> Self {
        Self { provider, client_config, metrics: MetricsRecorder::new() }
    }

    pub fn with_metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Issue a fresh token valid from now.
    pub async fn read_token(&self) -> std::result::Result<PackagedResponse, TokenAcquisitionError> {
        self.read_token_with_cancel(Utc::now(), &CancellationToken::new()).await
    }

    /// Issue a fresh token whose certificate is valid from `now`.
    pub async fn read_token_at(
        &self,
        now: DateTime<Utc>,
    ) -> std::result::Result<PackagedResponse, TokenAcquisitionError> {
        self.read_token_with_cancel(now, &CancellationToken::new()).await
    }

    /// Issue a fresh token; `cancel` aborts an in-flight STS exchange.
    pub async fn read_token_with_cancel(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> std::result::Result<PackagedResponse, TokenAcquisitionError> {
        match self.issue_detailed(now, cancel).await {
            Ok(response) => {
                self.metrics.record_token_read("success");
                info!(expires = %response.expires, "Token issued");
                Ok(response)
            }
            Err(error) => {
                self.metrics.record_token_read(error.stage());
                Err(error.into())
            }
        }
    }

    /// The pipeline with full error detail. Stops at the first failing step.
    #[instrument(skip_all, fields(now = %now))]
    pub async fn issue_detailed(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<PackagedResponse> {
        let config = self.provider.get_config().await?.ok_or(ConfigError::NotConfigured)?;

        let started = Instant::now();
        let region = config.region.clone();
        let forged = tokio::task::spawn_blocking(move || forge::forge(&region, now))
            .await
            .map_err(CryptoError::task)?;
        self.metrics.record_forge(forged.is_ok(), started.elapsed().as_secs_f64());
        let identity = forged?;

        debug!(
            region = %config.region,
            serial = %identity.certificate.serial_hex(),
            not_after = %identity.certificate.not_after(),
            "Client identity forged"
        );

        let started = Instant::now();
        let issued = sts::issue_token(&config, &identity, &self.client_config, cancel).await;
        self.metrics.record_exchange(issued.is_ok(), started.elapsed().as_secs_f64());
        let issued = issued?;

        Ok(packager::package(&issued.raw_token, issued.expires, &identity.signature)?)
    }
}

impl<S: ConfigStorage> TokenBackend<ConfigStore<S>> {
    /// Stored configuration without the password.
    pub async fn read_config(&self) -> std::result::Result<ConfigView, ConfigError> {
        self.provider.read().await
    }

    pub async fn write_config(
        &self,
        update: ConfigUpdate,
        mode: WriteMode,
    ) -> std::result::Result<(), ConfigError> {
        self.provider.write(update, mode).await
    }

    pub async fn delete_config(&self) -> std::result::Result<(), ConfigError> {
        self.provider.delete().await
    }

    pub async fn config_exists(&self) -> std::result::Result<bool, ConfigError> {
        self.provider.exists().await
    }
}
