use thiserror::Error;

/// Failures while forging a certificate or signing with its key.
///
/// Any of these aborts the whole forge; no partial certificate escapes.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// RSA key generation failed.
    #[error("Failed to generate RSA key pair: {source}")]
    KeyGeneration {
        #[source]
        source: rsa::Error,
    },

    /// The operating system random source could not be read.
    #[error("Secure random source unavailable: {source}")]
    Randomness {
        #[source]
        source: rand::Error,
    },

    /// A DER structure could not be encoded.
    #[error("ASN.1 encoding failed for {context}: {message}")]
    Encoding { context: String, message: String },

    /// Signing with the forged key failed.
    #[error("Signing failed: {message}")]
    Signing { message: String },

    /// Key material could not be serialized.
    #[error("Key export failed: {message}")]
    KeyExport { message: String },

    /// A forged certificate could not be read back.
    #[error("Certificate decode failed: {message}")]
    Decode { message: String },

    /// The blocking forge task panicked or was aborted.
    #[error("Forge task failed: {message}")]
    Task { message: String },
}

impl CryptoError {
    /// Create an encoding error for the named structure
    pub fn encoding(context: impl Into<String>, message: impl ToString) -> Self {
        Self::Encoding { context: context.into(), message: message.to_string() }
    }

    /// Create a signing error
    pub fn signing(message: impl ToString) -> Self {
        Self::Signing { message: message.to_string() }
    }

    /// Create a key export error
    pub fn key_export(message: impl ToString) -> Self {
        Self::KeyExport { message: message.to_string() }
    }

    /// Create a decode error
    pub fn decode(message: impl ToString) -> Self {
        Self::Decode { message: message.to_string() }
    }

    /// Create a task failure error
    pub fn task(message: impl ToString) -> Self {
        Self::Task { message: message.to_string() }
    }
}

impl From<rsa::Error> for CryptoError {
    fn from(source: rsa::Error) -> Self {
        Self::KeyGeneration { source }
    }
}

impl From<rand::Error> for CryptoError {
    fn from(source: rand::Error) -> Self {
        Self::Randomness { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_error_display() {
        let err = CryptoError::encoding("subjectAltName", "length overflow");
        assert_eq!(err.to_string(), "ASN.1 encoding failed for subjectAltName: length overflow");
    }

    #[test]
    fn test_key_generation_conversion() {
        let err: CryptoError = rsa::Error::InvalidModulus.into();
        assert!(matches!(err, CryptoError::KeyGeneration { .. }));
        assert!(err.to_string().starts_with("Failed to generate RSA key pair"));
    }
}
