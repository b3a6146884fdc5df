//! Reads forged certificates back out of DER.
//!
//! Used for diagnostics (`forge` subcommand, debug logs) and to recover the
//! region from a certificate without looking at its subject.

use chrono::{DateTime, TimeZone, Utc};
use simple_asn1::{ASN1Block, ASN1Class, BigInt, BigUint, OID};

use super::der::{
    OID_AUTHORITY_KEY_ID, OID_BASIC_CONSTRAINTS, OID_SUBJECT_ALT_NAME, OID_SUBJECT_KEY_ID,
    SAN_DNS_NAME_TAG,
};
use crate::errors::CryptoError;

/// One X.509v3 extension as found in the certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionEntry {
    pub oid: String,
    pub critical: bool,
    pub value: Vec<u8>,
}

/// Metadata extracted from a forged certificate.
#[derive(Debug, Clone)]
pub struct CertificateSummary {
    pub serial_number: Vec<u8>,
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub extensions: Vec<ExtensionEntry>,
}

impl CertificateSummary {
    pub fn parse(der: &[u8]) -> Result<Self, CryptoError> {
        let blocks = simple_asn1::from_der(der).map_err(CryptoError::decode)?;

        let cert_seq = match blocks.first() {
            Some(ASN1Block::Sequence(_, items)) => items,
            _ => return Err(CryptoError::decode("certificate missing outer sequence")),
        };

        let tbs_seq = match cert_seq.first() {
            Some(ASN1Block::Sequence(_, items)) => items,
            _ => return Err(CryptoError::decode("certificate missing tbsCertificate")),
        };

        let mut fields = tbs_seq.iter().peekable();

        // [0] EXPLICIT Version
        if let Some(ASN1Block::Explicit(ASN1Class::ContextSpecific, _, tag, _)) = fields.peek() {
            if tag != &BigUint::from(0u8) {
                return Err(CryptoError::decode(
                    "unexpected context-specific field before serial number",
                ));
            }
            fields.next();
        }

        let serial_number = match fields.next() {
            Some(ASN1Block::Integer(_, value)) => bigint_to_bytes(value),
            _ => return Err(CryptoError::decode("certificate missing serial number")),
        };

        // signature algorithm
        fields.next();

        let issuer = parse_name(
            fields.next().ok_or_else(|| CryptoError::decode("certificate missing issuer"))?,
        )?;
        let (not_before, not_after) = parse_validity(
            fields.next().ok_or_else(|| CryptoError::decode("certificate missing validity"))?,
        )?;
        let subject = parse_name(
            fields.next().ok_or_else(|| CryptoError::decode("certificate missing subject"))?,
        )?;

        // subjectPublicKeyInfo
        fields.next();

        let mut extensions = Vec::new();
        for field in fields {
            if let ASN1Block::Explicit(ASN1Class::ContextSpecific, _, tag, inner) = field {
                if tag == &BigUint::from(3u8) {
                    extensions = parse_extensions(inner)?;
                }
            }
        }

        Ok(Self { serial_number, subject, issuer, not_before, not_after, extensions })
    }

    pub fn extension(&self, oid: &str) -> Option<&ExtensionEntry> {
        self.extensions.iter().find(|ext| ext.oid == oid)
    }

    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }

    /// True when basicConstraints is present with `cA` set.
    pub fn is_ca(&self) -> bool {
        let Some(ext) = self.extension(OID_BASIC_CONSTRAINTS) else {
            return false;
        };
        match decode_single(&ext.value) {
            Ok(ASN1Block::Sequence(_, items)) => {
                matches!(items.first(), Some(ASN1Block::Boolean(_, true)))
            }
            _ => false,
        }
    }

    pub fn subject_key_id(&self) -> Option<Vec<u8>> {
        let ext = self.extension(OID_SUBJECT_KEY_ID)?;
        match decode_single(&ext.value).ok()? {
            ASN1Block::OctetString(_, bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn authority_key_id(&self) -> Option<Vec<u8>> {
        let ext = self.extension(OID_AUTHORITY_KEY_ID)?;
        match decode_single(&ext.value).ok()? {
            ASN1Block::Sequence(_, items) => items.into_iter().find_map(|item| {
                context_primitive_body(&item, 0).map(<[u8]>::to_vec)
            }),
            _ => None,
        }
    }

    /// Region carried in the subject alternative name.
    pub fn region(&self) -> Result<String, CryptoError> {
        let ext = self
            .extension(OID_SUBJECT_ALT_NAME)
            .ok_or_else(|| CryptoError::decode("certificate has no subjectAltName"))?;
        let names = match decode_single(&ext.value)? {
            ASN1Block::Sequence(_, names) => names,
            _ => return Err(CryptoError::decode("subjectAltName is not a sequence")),
        };
        let raw = names
            .iter()
            .find_map(|name| context_primitive_body(name, SAN_DNS_NAME_TAG))
            .ok_or_else(|| CryptoError::decode("subjectAltName carries no region"))?;
        String::from_utf8(raw.to_vec()).map_err(CryptoError::decode)
    }
}

/// Recover the region a certificate was forged for.
pub fn region_from_certificate(der: &[u8]) -> Result<String, CryptoError> {
    CertificateSummary::parse(der)?.region()
}

fn decode_single(der: &[u8]) -> Result<ASN1Block, CryptoError> {
    simple_asn1::from_der(der)
        .map_err(CryptoError::decode)?
        .into_iter()
        .next()
        .ok_or_else(|| CryptoError::decode("empty extension value"))
}

fn context_primitive_body(block: &ASN1Block, tag: u8) -> Option<&[u8]> {
    match block {
        ASN1Block::Unknown(ASN1Class::ContextSpecific, false, _, found, body)
            if found == &BigUint::from(tag) =>
        {
            Some(body.as_slice())
        }
        _ => None,
    }
}

fn parse_extensions(block: &ASN1Block) -> Result<Vec<ExtensionEntry>, CryptoError> {
    let entries = match block {
        ASN1Block::Sequence(_, items) => items,
        _ => return Err(CryptoError::decode("extensions are not a sequence")),
    };

    entries
        .iter()
        .map(|entry| {
            let items = match entry {
                ASN1Block::Sequence(_, items) => items,
                _ => return Err(CryptoError::decode("extension is not a sequence")),
            };
            let oid = match items.first() {
                Some(ASN1Block::ObjectIdentifier(_, oid)) => oid_to_string(oid),
                _ => return Err(CryptoError::decode("extension missing OID")),
            };
            let critical = items.iter().any(|item| matches!(item, ASN1Block::Boolean(_, true)));
            let value = items
                .iter()
                .find_map(|item| match item {
                    ASN1Block::OctetString(_, bytes) => Some(bytes.clone()),
                    _ => None,
                })
                .ok_or_else(|| CryptoError::decode(format!("extension {oid} missing value")))?;
            Ok(ExtensionEntry { oid, critical, value })
        })
        .collect()
}

fn parse_name(block: &ASN1Block) -> Result<String, CryptoError> {
    let rdns = match block {
        ASN1Block::Sequence(_, items) => items,
        _ => return Err(CryptoError::decode("name is not a sequence")),
    };

    let mut components = Vec::new();
    for rdn in rdns {
        let set_items = match rdn {
            ASN1Block::Set(_, items) => items,
            _ => continue,
        };

        for attr in set_items {
            if let ASN1Block::Sequence(_, attr_items) = attr {
                if attr_items.len() < 2 {
                    continue;
                }
                if let ASN1Block::ObjectIdentifier(_, oid) = &attr_items[0] {
                    if let Some(value) = extract_string_value(&attr_items[1]) {
                        let oid_string = oid_to_string(oid);
                        let short = match oid_string.as_str() {
                            "2.5.4.3" => "CN",
                            "2.5.4.6" => "C",
                            "2.5.4.7" => "L",
                            "2.5.4.8" => "ST",
                            "2.5.4.10" => "O",
                            "2.5.4.11" => "OU",
                            "0.9.2342.19200300.100.1.25" => "DC",
                            other => other,
                        };
                        components.push(format!("{short}={value}"));
                    }
                }
            }
        }
    }

    Ok(components.join(", "))
}

fn extract_string_value(block: &ASN1Block) -> Option<String> {
    match block {
        ASN1Block::UTF8String(_, value)
        | ASN1Block::PrintableString(_, value)
        | ASN1Block::IA5String(_, value) => Some(value.clone()),
        _ => None,
    }
}

fn parse_validity(block: &ASN1Block) -> Result<(DateTime<Utc>, DateTime<Utc>), CryptoError> {
    let entries = match block {
        ASN1Block::Sequence(_, items) if items.len() >= 2 => items,
        _ => return Err(CryptoError::decode("validity is not a two-entry sequence")),
    };

    Ok((time_block_to_chrono(&entries[0])?, time_block_to_chrono(&entries[1])?))
}

fn time_block_to_chrono(block: &ASN1Block) -> Result<DateTime<Utc>, CryptoError> {
    let primitive = match block {
        ASN1Block::UTCTime(_, value) | ASN1Block::GeneralizedTime(_, value) => value,
        _ => return Err(CryptoError::decode("time value not in expected format")),
    };

    let dt = primitive.assume_utc();
    Utc.timestamp_opt(dt.unix_timestamp(), dt.nanosecond())
        .single()
        .ok_or_else(|| CryptoError::decode("failed to convert certificate time"))
}

fn bigint_to_bytes(value: &BigInt) -> Vec<u8> {
    value.to_biguint().map_or_else(Vec::new, |v| v.to_bytes_be())
}

fn oid_to_string(oid: &OID) -> String {
    oid.as_vec::<u64>()
        .map(|components| {
            components.into_iter().map(|n| n.to_string()).collect::<Vec<_>>().join(".")
        })
        .unwrap_or_else(|_| "unknown".to_string())
}
