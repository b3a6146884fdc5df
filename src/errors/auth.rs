use thiserror::Error;

/// Failures while exchanging a forged certificate for an STS token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The configured authentication URL is unusable.
    #[error("Invalid STS endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The TLS session client could not be built.
    #[error("Failed to establish STS session: {message}")]
    SessionFailed { message: String },

    /// The token request failed on the wire or was rejected.
    #[error("Failed to issue STS token: {message}")]
    IssueFailed { message: String },

    /// The STS did not answer within the request timeout.
    #[error("STS request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The caller cancelled the exchange.
    #[error("STS exchange cancelled")]
    Cancelled,

    /// The STS answered with a SOAP fault.
    #[error("STS returned a fault: {fault}")]
    Fault { fault: String },

    /// The STS answered with something that is not a usable token response.
    #[error("Malformed STS response: {message}")]
    MalformedResponse { message: String },
}

impl AuthError {
    /// Create an invalid endpoint error
    pub fn invalid_endpoint(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidEndpoint { endpoint: endpoint.into(), reason: reason.to_string() }
    }

    /// Create a session establishment error
    pub fn session_failed(message: impl ToString) -> Self {
        Self::SessionFailed { message: message.to_string() }
    }

    /// Create an issuance error
    pub fn issue_failed(message: impl ToString) -> Self {
        Self::IssueFailed { message: message.to_string() }
    }

    /// Create a SOAP fault error
    pub fn fault(fault: impl Into<String>) -> Self {
        Self::Fault { fault: fault.into() }
    }

    /// Create a malformed response error
    pub fn malformed(message: impl ToString) -> Self {
        Self::MalformedResponse { message: message.to_string() }
    }

    /// Check if the caller may retry the exchange.
    ///
    /// An unusable endpoint will not fix itself; everything else might.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AuthError::InvalidEndpoint { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = AuthError::invalid_endpoint("::::", "empty host");
        assert!(matches!(err, AuthError::InvalidEndpoint { .. }));
        assert_eq!(err.to_string(), "Invalid STS endpoint '::::': empty host");

        let err = AuthError::fault("ns0:FailedAuthentication");
        assert!(err.to_string().contains("FailedAuthentication"));
    }

    #[test]
    fn test_retryable() {
        assert!(AuthError::Timeout { timeout_ms: 30_000 }.is_retryable());
        assert!(AuthError::Cancelled.is_retryable());
        assert!(AuthError::malformed("no token").is_retryable());
        assert!(!AuthError::invalid_endpoint("x", "y").is_retryable());
    }
}
