//! # Certificate Forge
//!
//! Builds the ephemeral client identity presented to the STS: a fresh
//! 2048-bit RSA key, a self-signed CA-flagged certificate carrying the region
//! in its subject alternative name, and a detached PKCS#1 v1.5 signature over
//! a fixed payload.
//!
//! Forging is pure apart from the operating system random source. Every call
//! produces a new key and a new 128-bit serial number; nothing is cached.
//!
//! ```rust,no_run
//! use chrono::Utc;
//!
//! let identity = sts_broker::forge::forge("us-east-1", Utc::now())?;
//! assert_eq!(identity.certificate.region(), "us-east-1");
//! # Ok::<(), sts_broker::errors::CryptoError>(())
//! ```

pub(crate) mod der;
pub mod inspect;

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, DurationRound, Utc};
use rand::{rngs::OsRng, RngCore};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs1v15::{SigningKey, VerifyingKey};
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use simple_asn1::{ASN1Block, BigUint};
use tracing::{debug, instrument};

use crate::errors::CryptoError;
use crate::secrets::SecretString;

pub use inspect::{region_from_certificate, CertificateSummary};

/// Lifetime of the requested token, and therefore of the certificate.
pub const TOKEN_LIFETIME_HOURS: i64 = 72;

/// RSA modulus size for forged keys.
pub const RSA_KEY_BITS: usize = 2048;

/// Literal payload covered by the detached signature.
pub const SIGNATURE_PAYLOAD: &[u8] = b"{}";

const SERIAL_NUMBER_BYTES: usize = 16;

/// Token (and certificate) lifetime as a duration.
pub fn token_lifetime() -> Duration {
    Duration::hours(TOKEN_LIFETIME_HOURS)
}

/// What to forge: the region identity and the validity window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    pub region: String,
    pub validity_start: DateTime<Utc>,
    pub validity_duration: Duration,
}

impl CertificateRequest {
    /// Request a certificate valid from `now` for exactly the token lifetime.
    ///
    /// `now` is truncated to whole seconds, the precision X.509 validity can
    /// express.
    pub fn new(region: impl Into<String>, now: DateTime<Utc>) -> Self {
        let validity_start = now.duration_trunc(Duration::seconds(1)).unwrap_or(now);
        Self { region: region.into(), validity_start, validity_duration: token_lifetime() }
    }

    /// End of the validity window. Fails when it falls outside the
    /// representable calendar.
    pub fn not_after(&self) -> Result<DateTime<Utc>, CryptoError> {
        self.validity_start
            .checked_add_signed(self.validity_duration)
            .ok_or_else(|| CryptoError::encoding("validity", "notAfter out of range"))
    }
}

/// Ephemeral RSA key pair owned by a single issuance.
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
}

impl KeyPair {
    /// Generate a fresh 2048-bit key from the OS random source.
    pub fn generate() -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)?;
        Ok(Self { private })
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.private.to_public_key()
    }

    /// DER-encoded SubjectPublicKeyInfo.
    pub fn public_key_der(&self) -> Result<Vec<u8>, CryptoError> {
        self.public_key()
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(CryptoError::key_export)
    }

    /// PKCS#1 `RSA PRIVATE KEY` PEM.
    pub fn private_key_pem(&self) -> Result<SecretString, CryptoError> {
        let pem = self.private.to_pkcs1_pem(LineEnding::LF).map_err(CryptoError::key_export)?;
        Ok(SecretString::new(pem.as_str()))
    }

    /// PKCS#1 v1.5 signature with SHA-256, blinded with the OS random source.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signing_key = SigningKey::<Sha256>::new(self.private.clone());
        let signature =
            signing_key.try_sign_with_rng(&mut OsRng, message).map_err(CryptoError::signing)?;
        Ok(signature.to_vec())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &RSA_KEY_BITS)
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// A signed, self-issued client certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    serial_number: Vec<u8>,
    region: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    key_id: Vec<u8>,
}

impl Certificate {
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn to_pem(&self) -> String {
        encode_pem("CERTIFICATE", &self.der)
    }

    /// Big-endian serial number bytes.
    pub fn serial_number(&self) -> &[u8] {
        &self.serial_number
    }

    pub fn serial_hex(&self) -> String {
        hex::encode(&self.serial_number)
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// SHA-256 of the SubjectPublicKeyInfo; both subject and authority key id.
    pub fn key_identifier(&self) -> &[u8] {
        &self.key_id
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("serial_number", &self.serial_hex())
            .field("region", &self.region)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .field("der", &format!("[{} bytes]", self.der.len()))
            .finish()
    }
}

/// Detached signature over [`SIGNATURE_PAYLOAD`].
///
/// Unrelated to TLS and to the token itself; it is returned to the caller as
/// an auxiliary artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// Check the signature against a public key.
    pub fn verify(&self, public_key: &RsaPublicKey) -> bool {
        let Ok(signature) = rsa::pkcs1v15::Signature::try_from(self.0.as_slice()) else {
            return false;
        };
        VerifyingKey::<Sha256>::new(public_key.clone())
            .verify(SIGNATURE_PAYLOAD, &signature)
            .is_ok()
    }
}

impl From<Vec<u8>> for Signature {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Everything one forge produces.
#[derive(Debug, Clone)]
pub struct ForgedIdentity {
    pub certificate: Certificate,
    pub key_pair: KeyPair,
    pub signature: Signature,
}

impl ForgedIdentity {
    /// Certificate followed by private key, as accepted for a TLS client identity.
    pub fn client_identity_pem(&self) -> Result<SecretString, CryptoError> {
        let key = self.key_pair.private_key_pem()?;
        Ok(SecretString::new(format!("{}{}", self.certificate.to_pem(), key.expose_secret())))
    }
}

/// Forge a fresh identity for `region`, valid from `now` for the token lifetime.
pub fn forge(region: &str, now: DateTime<Utc>) -> Result<ForgedIdentity, CryptoError> {
    let key_pair = KeyPair::generate()?;
    forge_with_key(&CertificateRequest::new(region, now), key_pair)
}

/// Forge around an already generated key. A new serial number is drawn on
/// every call.
#[instrument(skip_all, fields(region = %request.region))]
pub fn forge_with_key(
    request: &CertificateRequest,
    key_pair: KeyPair,
) -> Result<ForgedIdentity, CryptoError> {
    let serial_number = random_serial_number()?;

    let spki_der = key_pair.public_key_der()?;
    let key_id = Sha256::digest(&spki_der).to_vec();
    let subject_public_key_info = simple_asn1::from_der(&spki_der)
        .map_err(|e| CryptoError::encoding("subjectPublicKeyInfo", e))?
        .into_iter()
        .next()
        .ok_or_else(|| CryptoError::encoding("subjectPublicKeyInfo", "empty encoding"))?;

    let not_before = request.validity_start;
    let not_after = request.not_after()?;

    let tbs = der::tbs_certificate(der::TbsFields {
        serial_number: &serial_number,
        region: &request.region,
        not_before,
        not_after,
        subject_public_key_info,
        key_id: &key_id,
    })?;
    let tbs_der = der::encode("tbsCertificate", &tbs)?;
    let tbs_signature = key_pair.sign(&tbs_der)?;

    let certificate = ASN1Block::Sequence(
        0,
        vec![
            tbs,
            der::signature_algorithm(),
            ASN1Block::BitString(0, tbs_signature.len() * 8, tbs_signature),
        ],
    );
    let certificate_der = der::encode("certificate", &certificate)?;

    let signature = Signature(key_pair.sign(SIGNATURE_PAYLOAD)?);

    let certificate = Certificate {
        der: certificate_der,
        serial_number: serial_number.to_bytes_be(),
        region: request.region.clone(),
        not_before,
        not_after,
        key_id,
    };

    debug!(
        serial = %certificate.serial_hex(),
        not_before = %not_before,
        not_after = %not_after,
        "Forged self-signed client certificate"
    );

    Ok(ForgedIdentity { certificate, key_pair, signature })
}

/// Uniform over [0, 2^128).
fn random_serial_number() -> Result<BigUint, CryptoError> {
    let mut bytes = [0u8; SERIAL_NUMBER_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(BigUint::from_bytes_be(&bytes))
}

pub(crate) fn encode_pem(label: &str, der: &[u8]) -> String {
    let body = STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {label}-----\n");
    for line in body.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {label}-----\n"));
    pem
}
