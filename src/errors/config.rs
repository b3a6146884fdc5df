use thiserror::Error;

/// Failures reading, writing or validating the broker configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No STS configuration has been stored yet.
    #[error("STS configuration has not been set")]
    NotConfigured,

    /// An update was requested but nothing is stored.
    #[error("config not found during update operation")]
    NotFoundOnUpdate,

    /// One or more fields are missing or invalid.
    #[error("Invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// The backing storage failed.
    #[error("Configuration storage error: {message}")]
    Storage { message: String },

    /// A stored entry could not be encoded or decoded.
    #[error("Configuration serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Settings could not be loaded from file or environment.
    #[error("Settings loading failed: {0}")]
    Settings(#[from] config::ConfigError),
}

impl ConfigError {
    /// Create a storage error
    pub fn storage(message: impl ToString) -> Self {
        Self::Storage { message: message.to_string() }
    }
}

impl From<validator::ValidationErrors> for ConfigError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, field_errors)| {
                field_errors.iter().map(move |e| {
                    let message =
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string());
                    format!("{}: {}", field, message)
                })
            })
            .collect();
        messages.sort();
        Self::Validation(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_joins_messages() {
        let err = ConfigError::Validation(vec![
            "Region is required".to_string(),
            "Username is required".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid configuration: Region is required; Username is required"
        );
    }
}
