//! STS connection settings and the provider seam the token pipeline reads them
//! through.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;
use validator::{Validate, ValidationError};

use crate::errors::ConfigError;
use crate::secrets::SecretString;

/// Connection and identity settings for one STS tenant.
///
/// `api_url` is carried for callers but plays no part in token issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct StsConfig {
    #[validate(custom(
        function = "validate_service_url",
        message = "Given authentication url is not valid url"
    ))]
    pub authentication_url: String,

    #[validate(custom(
        function = "validate_service_url",
        message = "Given API url is not valid url"
    ))]
    pub api_url: String,

    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    pub password: SecretString,

    #[validate(length(min = 1, message = "Region is required"))]
    pub region: String,
}

/// Accepts absolute http(s) URLs and bare `host[:port][/path]` forms.
pub fn validate_service_url(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    match Url::parse(&candidate) {
        Ok(url)
            if matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|host| !host.is_empty()) =>
        {
            Ok(())
        }
        _ => Err(ValidationError::new("invalid_url")),
    }
}

/// Source of the STS configuration for a token read.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// `Ok(None)` when nothing has been configured yet.
    async fn get_config(&self) -> Result<Option<StsConfig>, ConfigError>;
}

/// Provider over a fixed value, e.g. loaded once from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    config: Option<StsConfig>,
}

impl StaticConfigProvider {
    pub fn new(config: StsConfig) -> Self {
        Self { config: Some(config) }
    }

    pub fn empty() -> Self {
        Self { config: None }
    }

    /// Load and validate a JSON document with the `StsConfig` keys.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::storage(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: StsConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(Self::new(config))
    }
}

#[async_trait]
impl ConfigProvider for StaticConfigProvider {
    async fn get_config(&self) -> Result<Option<StsConfig>, ConfigError> {
        Ok(self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StsConfig {
        StsConfig {
            authentication_url: "https://vcenter.example/sts/STSService".to_string(),
            api_url: "https://vro.example/vco/api".to_string(),
            username: "administrator@vsphere.local".to_string(),
            password: SecretString::new("hunter2"),
            region: "us-east-1".to_string(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_service_url_forms() {
        assert!(validate_service_url("vcenter.example").is_ok());
        assert!(validate_service_url("vcenter.example:8443/sts").is_ok());
        assert!(validate_service_url("http://10.0.0.1").is_ok());
        assert!(validate_service_url("::::").is_err());
        assert!(validate_service_url("ftp://vcenter.example").is_err());
        assert!(validate_service_url("").is_err());
    }

    #[test]
    fn test_invalid_fields_are_all_reported() {
        let config = StsConfig {
            authentication_url: "::::".to_string(),
            username: String::new(),
            ..sample()
        };
        let err = ConfigError::from(config.validate().unwrap_err());
        let ConfigError::Validation(messages) = err else {
            panic!("expected validation error");
        };
        assert_eq!(
            messages,
            vec![
                "authentication_url: Given authentication url is not valid url".to_string(),
                "username: Username is required".to_string(),
            ]
        );
    }

    #[test]
    fn test_serialized_config_redacts_password() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("\"region\":\"us-east-1\""));
    }

    #[tokio::test]
    async fn test_static_provider() {
        assert_eq!(StaticConfigProvider::new(sample()).get_config().await.unwrap(), Some(sample()));
        assert_eq!(StaticConfigProvider::empty().get_config().await.unwrap(), None);
    }
}
