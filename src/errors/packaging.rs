use thiserror::Error;

/// Failures while compressing an issued token.
#[derive(Debug, Error)]
pub enum PackagingError {
    /// The gzip stream failed to accept or finalize the token bytes.
    #[error("Token compression failed: {source}")]
    Compression {
        #[source]
        source: std::io::Error,
    },
}

impl From<std::io::Error> for PackagingError {
    fn from(source: std::io::Error) -> Self {
        Self::Compression { source }
    }
}
