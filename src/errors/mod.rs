//! # Error Handling
//!
//! Error types for the token broker, one enum per pipeline stage, all built
//! with `thiserror`. The stage errors carry full detail for operators; the
//! caller-facing boundary only ever sees [`TokenAcquisitionError`].

pub mod auth;
pub mod config;
pub mod crypto;
pub mod packaging;

pub use auth::AuthError;
pub use config::ConfigError;
pub use crypto::CryptoError;
pub use packaging::PackagingError;

/// Custom result type for broker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Message returned to callers whenever a token read fails.
pub const TOKEN_ACQUISITION_FAILED: &str = "Failed to acquire token";

/// Main error type for the token pipeline
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Certificate forging failed
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// STS session or issuance failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Token compression failed
    #[error(transparent)]
    Packaging(#[from] PackagingError),

    /// Configuration missing or invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Short stage label used in logs and metrics
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Crypto(_) => "forge",
            Error::Auth(_) => "exchange",
            Error::Packaging(_) => "package",
            Error::Config(_) => "config",
        }
    }

    /// Whether a caller may reasonably retry the whole read.
    ///
    /// Nothing is mutated by a failed read, so this only reflects whether the
    /// failure is likely transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Auth(err) => err.is_retryable(),
            Error::Config(ConfigError::Storage { .. }) => true,
            _ => false,
        }
    }
}

/// Opaque error handed to callers of the token read.
///
/// Root causes stay in the operator log; the display text never varies.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{}", TOKEN_ACQUISITION_FAILED)]
pub struct TokenAcquisitionError;

impl From<Error> for TokenAcquisitionError {
    fn from(error: Error) -> Self {
        tracing::error!(
            stage = error.stage(),
            retryable = error.is_retryable(),
            error = %error,
            "Token acquisition failed"
        );
        TokenAcquisitionError
    }
}
