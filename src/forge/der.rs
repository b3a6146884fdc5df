//! DER building blocks for the forged client certificate.
//!
//! Everything here produces `simple_asn1` blocks; encoding to bytes happens
//! once per structure in [`encode`].

use chrono::{DateTime, Datelike, Utc};
use simple_asn1::{oid, to_der, ASN1Block, ASN1Class, BigInt, BigUint, OID};

use crate::errors::CryptoError;

pub(crate) const COUNTRY: &str = "US";
pub(crate) const PROVINCE: &str = "California";
pub(crate) const LOCALITY: &str = "Palo Alto";
pub(crate) const ORGANIZATIONAL_UNIT: &str = "VMware Engineering";
pub(crate) const COMMON_NAME: &str = "CA";
pub(crate) const DOMAIN_COMPONENTS: [&str; 2] = ["vsphere", "local"];

pub(crate) const OID_SUBJECT_ALT_NAME: &str = "2.5.29.17";
pub(crate) const OID_SUBJECT_KEY_ID: &str = "2.5.29.14";
pub(crate) const OID_AUTHORITY_KEY_ID: &str = "2.5.29.35";
pub(crate) const OID_BASIC_CONSTRAINTS: &str = "2.5.29.19";
pub(crate) const OID_KEY_USAGE: &str = "2.5.29.15";
pub(crate) const OID_EXT_KEY_USAGE: &str = "2.5.29.37";

/// GeneralName tag for dNSName, used to carry the raw region bytes.
pub(crate) const SAN_DNS_NAME_TAG: u8 = 2;

// digitalSignature | contentCommitment | keyEncipherment | dataEncipherment
const KEY_USAGE_BITS: u8 = 0b1111_0000;
const KEY_USAGE_BIT_LEN: usize = 4;

/// Inputs for the to-be-signed portion of the certificate.
pub(crate) struct TbsFields<'a> {
    pub serial_number: &'a BigUint,
    pub region: &'a str,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub subject_public_key_info: ASN1Block,
    pub key_id: &'a [u8],
}

pub(crate) fn encode(context: &str, block: &ASN1Block) -> Result<Vec<u8>, CryptoError> {
    to_der(block).map_err(|e| CryptoError::encoding(context, e))
}

/// `sha256WithRSAEncryption` with explicit NULL parameters.
pub(crate) fn signature_algorithm() -> ASN1Block {
    ASN1Block::Sequence(
        0,
        vec![
            ASN1Block::ObjectIdentifier(0, oid!(1, 2, 840, 113549, 1, 1, 11)),
            ASN1Block::Null(0),
        ],
    )
}

fn domain_component() -> OID {
    oid!(0, 9, 2342, 19200300, 100, 1, 25)
}

/// Subject (and issuer) name. Attribute order is fixed; each attribute is its
/// own RDN so the two domain components survive side by side.
pub(crate) fn distinguished_name(region: &str) -> ASN1Block {
    let mut rdns = vec![
        attribute(oid!(2, 5, 4, 6), COUNTRY),
        attribute(oid!(2, 5, 4, 8), PROVINCE),
        attribute(oid!(2, 5, 4, 7), LOCALITY),
        attribute(oid!(2, 5, 4, 10), region),
        attribute(oid!(2, 5, 4, 11), ORGANIZATIONAL_UNIT),
        attribute(oid!(2, 5, 4, 3), COMMON_NAME),
    ];
    rdns.extend(DOMAIN_COMPONENTS.iter().map(|dc| attribute(domain_component(), dc)));
    ASN1Block::Sequence(0, rdns)
}

fn attribute(kind: OID, value: &str) -> ASN1Block {
    ASN1Block::Set(
        0,
        vec![ASN1Block::Sequence(
            0,
            vec![ASN1Block::ObjectIdentifier(0, kind), directory_string(value)],
        )],
    )
}

fn directory_string(value: &str) -> ASN1Block {
    if value.chars().all(is_printable) {
        ASN1Block::PrintableString(0, value.to_string())
    } else {
        ASN1Block::UTF8String(0, value.to_string())
    }
}

fn is_printable(c: char) -> bool {
    c.is_ascii_alphanumeric() || " '()+,-./:=?".contains(c)
}

/// UTCTime up to 2049, GeneralizedTime afterwards (RFC 5280 4.1.2.5).
pub(crate) fn validity_time(moment: DateTime<Utc>) -> Result<ASN1Block, CryptoError> {
    let instant = time::OffsetDateTime::from_unix_timestamp(moment.timestamp())
        .map_err(|e| CryptoError::encoding("validity", e))?;
    let primitive = time::PrimitiveDateTime::new(instant.date(), instant.time());

    if (1950..2050).contains(&moment.year()) {
        Ok(ASN1Block::UTCTime(0, primitive))
    } else {
        Ok(ASN1Block::GeneralizedTime(0, primitive))
    }
}

/// Dotted-decimal OID string to a `simple_asn1` identifier.
pub(crate) fn parse_oid(dotted: &str) -> Result<OID, CryptoError> {
    let arcs = dotted
        .split('.')
        .map(|arc| arc.parse::<u64>().map(BigUint::from))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CryptoError::encoding("object identifier", format!("{dotted}: {e}")))?;
    Ok(OID::new(arcs))
}

fn extension(
    id: &str,
    name: &str,
    critical: bool,
    value: &ASN1Block,
) -> Result<ASN1Block, CryptoError> {
    let mut fields = vec![ASN1Block::ObjectIdentifier(0, parse_oid(id)?)];
    if critical {
        fields.push(ASN1Block::Boolean(0, true));
    }
    fields.push(ASN1Block::OctetString(0, encode(name, value)?));
    Ok(ASN1Block::Sequence(0, fields))
}

fn context_primitive(tag: u8, body: &[u8]) -> ASN1Block {
    ASN1Block::Unknown(ASN1Class::ContextSpecific, false, 0, BigUint::from(tag), body.to_vec())
}

/// SubjectAltName holding a single dNSName with the region's bytes verbatim.
pub(crate) fn region_alt_name(region: &str) -> ASN1Block {
    ASN1Block::Sequence(0, vec![context_primitive(SAN_DNS_NAME_TAG, region.as_bytes())])
}

fn extensions(key_id: &[u8], region: &str) -> Result<ASN1Block, CryptoError> {
    let key_usage = ASN1Block::BitString(0, KEY_USAGE_BIT_LEN, vec![KEY_USAGE_BITS]);
    let client_auth = ASN1Block::Sequence(
        0,
        vec![ASN1Block::ObjectIdentifier(0, oid!(1, 3, 6, 1, 5, 5, 7, 3, 2))],
    );
    let basic_constraints = ASN1Block::Sequence(0, vec![ASN1Block::Boolean(0, true)]);
    let subject_key_id = ASN1Block::OctetString(0, key_id.to_vec());
    let authority_key_id = ASN1Block::Sequence(0, vec![context_primitive(0, key_id)]);

    let entries = vec![
        extension(OID_KEY_USAGE, "keyUsage", true, &key_usage)?,
        extension(OID_EXT_KEY_USAGE, "extKeyUsage", false, &client_auth)?,
        extension(OID_BASIC_CONSTRAINTS, "basicConstraints", true, &basic_constraints)?,
        extension(OID_SUBJECT_KEY_ID, "subjectKeyIdentifier", false, &subject_key_id)?,
        extension(OID_AUTHORITY_KEY_ID, "authorityKeyIdentifier", false, &authority_key_id)?,
        extension(OID_SUBJECT_ALT_NAME, "subjectAltName", false, &region_alt_name(region))?,
    ];

    Ok(ASN1Block::Explicit(
        ASN1Class::ContextSpecific,
        0,
        BigUint::from(3u8),
        Box::new(ASN1Block::Sequence(0, entries)),
    ))
}

/// Self-issued TBSCertificate: issuer and subject are the same name.
pub(crate) fn tbs_certificate(fields: TbsFields<'_>) -> Result<ASN1Block, CryptoError> {
    let version = ASN1Block::Explicit(
        ASN1Class::ContextSpecific,
        0,
        BigUint::from(0u8),
        Box::new(ASN1Block::Integer(0, BigInt::from(2))),
    );
    let name = distinguished_name(fields.region);
    let validity = ASN1Block::Sequence(
        0,
        vec![validity_time(fields.not_before)?, validity_time(fields.not_after)?],
    );

    Ok(ASN1Block::Sequence(
        0,
        vec![
            version,
            ASN1Block::Integer(0, BigInt::from(fields.serial_number.clone())),
            signature_algorithm(),
            name.clone(),
            validity,
            name,
            fields.subject_public_key_info,
            extensions(fields.key_id, fields.region)?,
        ],
    ))
}
