//! Read/write/delete/exists over the stored STS configuration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use validator::Validate;

use super::provider::{ConfigProvider, StsConfig};
use super::storage::ConfigStorage;
use crate::errors::ConfigError;
use crate::secrets::SecretString;

/// Storage key of the single configuration entry.
pub const CONFIG_STORAGE_KEY: &str = "config";

/// Whether a write may create the entry or must replace an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

/// Fields supplied to a write. All of them are required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    pub authentication_url: Option<String>,
    pub api_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub region: Option<String>,
}

/// What a read returns: everything except the password.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigView {
    pub authentication_url: String,
    pub api_url: String,
    pub username: String,
    pub region: String,
}

impl From<&StsConfig> for ConfigView {
    fn from(config: &StsConfig) -> Self {
        Self {
            authentication_url: config.authentication_url.clone(),
            api_url: config.api_url.clone(),
            username: config.username.clone(),
            region: config.region.clone(),
        }
    }
}

// On-disk shape; unlike StsConfig it serializes the real password.
#[derive(Serialize, Deserialize)]
struct StoredConfig {
    authentication_url: String,
    api_url: String,
    username: String,
    password: String,
    region: String,
}

impl From<&StsConfig> for StoredConfig {
    fn from(config: &StsConfig) -> Self {
        Self {
            authentication_url: config.authentication_url.clone(),
            api_url: config.api_url.clone(),
            username: config.username.clone(),
            password: config.password.expose_secret().to_string(),
            region: config.region.clone(),
        }
    }
}

impl From<StoredConfig> for StsConfig {
    fn from(stored: StoredConfig) -> Self {
        Self {
            authentication_url: stored.authentication_url,
            api_url: stored.api_url,
            username: stored.username,
            password: SecretString::from(stored.password),
            region: stored.region,
        }
    }
}

/// Configuration CRUD on top of a [`ConfigStorage`].
#[derive(Debug, Clone)]
pub struct ConfigStore<S> {
    storage: S,
}

impl<S: ConfigStorage> ConfigStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// The stored configuration, if any.
    pub async fn load(&self) -> Result<Option<StsConfig>, ConfigError> {
        let Some(raw) = self.storage.get(CONFIG_STORAGE_KEY).await? else {
            return Ok(None);
        };
        let stored: StoredConfig = serde_json::from_slice(&raw)?;
        Ok(Some(stored.into()))
    }

    /// Stored configuration without the password; empty when unset.
    pub async fn read(&self) -> Result<ConfigView, ConfigError> {
        Ok(self.load().await?.as_ref().map(ConfigView::from).unwrap_or_default())
    }

    /// Validate and persist a full configuration.
    ///
    /// Every missing or invalid field is reported in one
    /// [`ConfigError::Validation`]. `Update` fails with
    /// [`ConfigError::NotFoundOnUpdate`] when nothing is stored yet.
    pub async fn write(&self, update: ConfigUpdate, mode: WriteMode) -> Result<(), ConfigError> {
        if mode == WriteMode::Update && !self.exists().await? {
            return Err(ConfigError::NotFoundOnUpdate);
        }

        let mut problems = Vec::new();
        let mut missing = Vec::new();
        let mut require = |field: &'static str, value: Option<String>, message: &str| {
            match value.filter(|v| !v.trim().is_empty()) {
                Some(value) => value,
                None => {
                    missing.push(field);
                    problems.push(message.to_string());
                    String::new()
                }
            }
        };

        let authentication_url = require(
            "authentication_url",
            update.authentication_url,
            "Authentication url is required",
        );
        let api_url = require("api_url", update.api_url, "API url is required");
        let username = require("username", update.username, "Username is required");
        let password = require(
            "password",
            update.password.map(|p| p.expose_secret().to_string()),
            "Password is required",
        );
        let region = require("region", update.region, "Region is required");

        let candidate = StsConfig {
            authentication_url,
            api_url,
            username,
            password: SecretString::from(password),
            region,
        };

        if let Err(errors) = candidate.validate() {
            let mut invalid: Vec<String> = errors
                .field_errors()
                .into_iter()
                .filter(|(field, _)| !missing.iter().any(|m| *m == field.as_ref()))
                .flat_map(|(field, field_errors)| {
                    field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map_or_else(|| format!("{field} is invalid"), |m| m.to_string())
                        })
                        .collect::<Vec<_>>()
                })
                .collect();
            invalid.sort();
            problems.extend(invalid);
        }

        if !problems.is_empty() {
            debug!(problems = problems.len(), "Rejected STS configuration write");
            return Err(ConfigError::Validation(problems));
        }

        let raw = serde_json::to_vec(&StoredConfig::from(&candidate))?;
        self.storage.put(CONFIG_STORAGE_KEY, raw).await?;

        info!(region = %candidate.region, mode = ?mode, "STS configuration saved");
        Ok(())
    }

    pub async fn delete(&self) -> Result<(), ConfigError> {
        self.storage.delete(CONFIG_STORAGE_KEY).await?;
        info!("STS configuration deleted");
        Ok(())
    }

    pub async fn exists(&self) -> Result<bool, ConfigError> {
        Ok(self.storage.get(CONFIG_STORAGE_KEY).await?.is_some())
    }
}

#[async_trait]
impl<S: ConfigStorage> ConfigProvider for ConfigStore<S> {
    async fn get_config(&self) -> Result<Option<StsConfig>, ConfigError> {
        self.load().await
    }
}
