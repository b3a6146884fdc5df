//! # Token Packager
//!
//! Turns an issued token into the externally visible response: the raw token
//! gzip-compressed and base64-encoded, the expiry as a millisecond UTC
//! timestamp, and the detached signature passed through untouched.

use std::io::Write;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use flate2::{write::GzEncoder, Compression};
use serde::{Serialize, Serializer};
use tracing::{debug, instrument};

use crate::errors::PackagingError;
use crate::forge::Signature;

/// `2006-01-02T15:04:05.000Z` layout.
pub const EXPIRY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Response handed back to the caller of a token read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackagedResponse {
    /// base64(gzip(raw token))
    pub token: String,
    pub expires: String,
    /// Raw signature bytes; base64 when serialized.
    #[serde(serialize_with = "serialize_base64")]
    pub signature: Vec<u8>,
}

fn serialize_base64<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&STANDARD.encode(bytes))
}

/// Package an issued token. Any stream error aborts the whole response.
#[instrument(skip_all, fields(token_bytes = raw_token.len()))]
pub fn package(
    raw_token: &[u8],
    expires: DateTime<Utc>,
    signature: &Signature,
) -> Result<PackagedResponse, PackagingError> {
    let compressed = compress(raw_token)?;
    debug!(compressed_bytes = compressed.len(), "Token packaged");

    Ok(PackagedResponse {
        token: STANDARD.encode(compressed),
        expires: format_expiry(expires),
        signature: signature.as_bytes().to_vec(),
    })
}

/// gzip with the stream fully finished before the buffer is read.
pub fn compress(raw: &[u8]) -> Result<Vec<u8>, PackagingError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw)?;
    encoder.flush()?;
    Ok(encoder.finish()?)
}

pub fn format_expiry(expires: DateTime<Utc>) -> String {
    expires.format(EXPIRY_FORMAT).to_string()
}
