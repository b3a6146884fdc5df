//! WS-Trust 1.3 SOAP envelopes for the token exchange.
//!
//! Writes the `RequestSecurityToken` Issue request and reads the matching
//! `RequestSecurityTokenResponse`. The issued token is kept as the verbatim
//! inner XML of `RequestedSecurityToken`.
//!
//! The request proves possession of the forged key: `wsu:Timestamp` and
//! `soap:Body` are written directly in exclusive canonical form, digested with
//! SHA-256 and covered by an RSA-SHA256 `ds:Signature` whose key info points
//! at the certificate in the `BinarySecurityToken`.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use sha2::{Digest, Sha256};

use super::{IssuedToken, TokenRequest};
use crate::errors::AuthError;
use crate::forge::KeyPair;

pub const NS_SOAP: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const NS_WSSE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const NS_WSU: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
pub const NS_WST: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512";
pub const NS_DS: &str = "http://www.w3.org/2000/09/xmldsig#";

pub const SOAP_ACTION_ISSUE: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/RST/Issue";
pub const CONTENT_TYPE: &str = "text/xml; charset=utf-8";

const TOKEN_TYPE_SAML2: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
const REQUEST_TYPE_ISSUE: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Issue";
const KEY_TYPE_PUBLIC_KEY: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/PublicKey";
const SIGNATURE_ALGORITHM_RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
const PASSWORD_TEXT: &str = concat!(
    "http://docs.oasis-open.org/wss/2004/01/",
    "oasis-200401-wss-username-token-profile-1.0#PasswordText"
);
const BASE64_BINARY: &str = concat!(
    "http://docs.oasis-open.org/wss/2004/01/",
    "oasis-200401-wss-soap-message-security-1.0#Base64Binary"
);
const X509_V3: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";

const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
const DIGEST_SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

const TIMESTAMP_ID: &str = "Timestamp";
const BODY_ID: &str = "Body";
const CERTIFICATE_ID: &str = "Certificate";
const SIGNATURE_ID: &str = "Signature";

/// Validity of the WS-Security message timestamp, not of the token.
const MESSAGE_TTL_MINUTES: i64 = 10;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

fn timestamp(moment: DateTime<Utc>) -> String {
    moment.format(TIMESTAMP_FORMAT).to_string()
}

struct EnvelopeWriter {
    inner: Writer<Vec<u8>>,
}

impl EnvelopeWriter {
    fn new() -> Self {
        Self { inner: Writer::new(Vec::new()) }
    }

    fn write(&mut self, event: Event<'_>) -> Result<(), AuthError> {
        self.inner
            .write_event(event)
            .map_err(|e| AuthError::issue_failed(format!("failed to encode request: {e}")))
    }

    fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), AuthError> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.write(Event::Start(element))
    }

    fn end(&mut self, name: &str) -> Result<(), AuthError> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    /// Splice in an already serialized fragment verbatim.
    fn raw(&mut self, fragment: &str) -> Result<(), AuthError> {
        self.write(Event::Text(BytesText::from_escaped(fragment)))
    }

    fn text_element(
        &mut self,
        name: &str,
        attributes: &[(&str, &str)],
        text: &str,
    ) -> Result<(), AuthError> {
        self.start(name, attributes)?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn finish(self) -> Result<String, AuthError> {
        String::from_utf8(self.inner.into_inner())
            .map_err(|e| AuthError::issue_failed(format!("failed to encode request: {e}")))
    }
}

/// Writes XML fragments that are already in exclusive canonical form: every
/// element gets an explicit end tag, attributes are emitted in the order given
/// (namespace declarations first, then attributes sorted by namespace and
/// name), and nothing is written between elements.
struct CanonicalWriter {
    out: String,
}

impl CanonicalWriter {
    fn new() -> Self {
        Self { out: String::new() }
    }

    fn start(&mut self, name: &str, attributes: &[(&str, &str)]) {
        self.out.push('<');
        self.out.push_str(name);
        for (key, value) in attributes {
            self.out.push(' ');
            self.out.push_str(key);
            self.out.push_str("=\"");
            self.out.push_str(&escape_attribute(value));
            self.out.push('"');
        }
        self.out.push('>');
    }

    fn end(&mut self, name: &str) {
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) {
        self.start(name, attributes);
        self.end(name);
    }

    fn text_element(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) {
        self.start(name, attributes);
        self.out.push_str(&escape_text(text));
        self.end(name);
    }

    fn raw(&mut self, fragment: &str) {
        self.out.push_str(fragment);
    }

    fn finish(self) -> String {
        self.out
    }
}

fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\r' => escaped.push_str("&#xD;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '"' => escaped.push_str("&quot;"),
            '\t' => escaped.push_str("&#x9;"),
            '\n' => escaped.push_str("&#xA;"),
            '\r' => escaped.push_str("&#xD;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn fragment_id(id: &str) -> String {
    format!("#{id}")
}

fn later(moment: DateTime<Utc>, by: Duration) -> Result<DateTime<Utc>, AuthError> {
    moment
        .checked_add_signed(by)
        .ok_or_else(|| AuthError::issue_failed("request timestamp out of range"))
}

/// Signed `wsu:Timestamp` for the security header.
fn security_timestamp(created: DateTime<Utc>) -> Result<String, AuthError> {
    let expires = later(created, Duration::minutes(MESSAGE_TTL_MINUTES))?;

    let mut w = CanonicalWriter::new();
    w.start("wsu:Timestamp", &[("xmlns:wsu", NS_WSU), ("wsu:Id", TIMESTAMP_ID)]);
    w.text_element("wsu:Created", &[], &timestamp(created));
    w.text_element("wsu:Expires", &[], &timestamp(expires));
    w.end("wsu:Timestamp");
    Ok(w.finish())
}

/// Signed `soap:Body` carrying the `RequestSecurityToken`.
fn request_body(
    request: &TokenRequest<'_>,
    created: DateTime<Utc>,
) -> Result<String, AuthError> {
    let expires = later(created, request.lifetime)?;
    let signature_ref = fragment_id(SIGNATURE_ID);

    let mut w = CanonicalWriter::new();
    w.start(
        "soap:Body",
        &[("xmlns:soap", NS_SOAP), ("xmlns:wsu", NS_WSU), ("wsu:Id", BODY_ID)],
    );
    w.start("wst:RequestSecurityToken", &[("xmlns:wst", NS_WST)]);
    w.text_element("wst:TokenType", &[], TOKEN_TYPE_SAML2);
    w.text_element("wst:RequestType", &[], REQUEST_TYPE_ISSUE);
    w.start("wst:Lifetime", &[]);
    w.text_element("wsu:Created", &[], &timestamp(created));
    w.text_element("wsu:Expires", &[], &timestamp(expires));
    w.end("wst:Lifetime");
    w.empty("wst:Renewing", &[("Allow", "false"), ("OK", "false")]);
    w.text_element("wst:Delegatable", &[], if request.delegatable { "true" } else { "false" });
    w.text_element("wst:KeyType", &[], KEY_TYPE_PUBLIC_KEY);
    w.text_element("wst:SignatureAlgorithm", &[], SIGNATURE_ALGORITHM_RSA_SHA256);
    w.empty("wst:UseKey", &[("Sig", signature_ref.as_str())]);
    w.end("wst:RequestSecurityToken");
    w.end("soap:Body");
    Ok(w.finish())
}

/// `ds:SignedInfo` with one SHA-256 reference per signed fragment.
fn signed_info(references: &[(&str, &str)]) -> String {
    let mut w = CanonicalWriter::new();
    w.start("ds:SignedInfo", &[("xmlns:ds", NS_DS)]);
    w.empty("ds:CanonicalizationMethod", &[("Algorithm", EXCLUSIVE_C14N)]);
    w.empty("ds:SignatureMethod", &[("Algorithm", SIGNATURE_ALGORITHM_RSA_SHA256)]);
    for (id, fragment) in references {
        let uri = fragment_id(id);
        w.start("ds:Reference", &[("URI", uri.as_str())]);
        w.start("ds:Transforms", &[]);
        w.empty("ds:Transform", &[("Algorithm", EXCLUSIVE_C14N)]);
        w.end("ds:Transforms");
        w.empty("ds:DigestMethod", &[("Algorithm", DIGEST_SHA256)]);
        w.text_element("ds:DigestValue", &[], &STANDARD.encode(Sha256::digest(fragment)));
        w.end("ds:Reference");
    }
    w.end("ds:SignedInfo");
    w.finish()
}

/// Enveloped signature over the timestamp and body, made with the forged key
/// and pointing at the certificate carried in the `BinarySecurityToken`.
fn message_signature(key_pair: &KeyPair, timestamp: &str, body: &str) -> Result<String, AuthError> {
    let signed_info = signed_info(&[(TIMESTAMP_ID, timestamp), (BODY_ID, body)]);
    let signature = key_pair
        .sign(signed_info.as_bytes())
        .map_err(|e| AuthError::issue_failed(format!("failed to sign request: {e}")))?;
    let certificate_ref = fragment_id(CERTIFICATE_ID);

    let mut w = CanonicalWriter::new();
    w.start("ds:Signature", &[("xmlns:ds", NS_DS), ("Id", SIGNATURE_ID)]);
    w.raw(&signed_info);
    w.text_element("ds:SignatureValue", &[], &STANDARD.encode(signature));
    w.start("ds:KeyInfo", &[]);
    w.start("wsse:SecurityTokenReference", &[("xmlns:wsse", NS_WSSE)]);
    w.empty("wsse:Reference", &[("URI", certificate_ref.as_str()), ("ValueType", X509_V3)]);
    w.end("wsse:SecurityTokenReference");
    w.end("ds:KeyInfo");
    w.end("ds:Signature");
    Ok(w.finish())
}

/// Build the SOAP Issue request for `request`, timestamped at `created`.
///
/// The timestamp and body are signed with `request.key_pair`, so the STS can
/// bind the issued holder-of-key token to the forged certificate.
pub fn issue_request(
    request: &TokenRequest<'_>,
    created: DateTime<Utc>,
) -> Result<String, AuthError> {
    let security_timestamp = security_timestamp(created)?;
    let body = request_body(request, created)?;
    let signature = message_signature(request.key_pair, &security_timestamp, &body)?;

    let mut w = EnvelopeWriter::new();

    w.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    w.start(
        "soap:Envelope",
        &[("xmlns:soap", NS_SOAP), ("xmlns:wsse", NS_WSSE), ("xmlns:wsu", NS_WSU)],
    )?;

    w.start("soap:Header", &[])?;
    w.start("wsse:Security", &[("soap:mustUnderstand", "1")])?;
    w.raw(&security_timestamp)?;

    if !request.identity.username.is_empty() {
        w.start("wsse:UsernameToken", &[])?;
        w.text_element("wsse:Username", &[], &request.identity.username)?;
        w.text_element(
            "wsse:Password",
            &[("Type", PASSWORD_TEXT)],
            request.identity.password.expose_secret(),
        )?;
        w.end("wsse:UsernameToken")?;
    }

    let certificate = STANDARD.encode(request.certificate.der());
    w.text_element(
        "wsse:BinarySecurityToken",
        &[("EncodingType", BASE64_BINARY), ("ValueType", X509_V3), ("wsu:Id", CERTIFICATE_ID)],
        &certificate,
    )?;
    w.raw(&signature)?;

    w.end("wsse:Security")?;
    w.end("soap:Header")?;
    w.raw(&body)?;
    w.end("soap:Envelope")?;
    w.finish()
}

/// What a response body turned out to contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Token(IssuedToken),
    Fault(String),
}

/// Read an Issue response or SOAP fault.
pub fn parse_response(xml: &str) -> Result<ResponseBody, AuthError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut raw_token: Option<Vec<u8>> = None;
    let mut expires: Option<String> = None;
    let mut fault_code: Option<String> = None;
    let mut fault_string: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "RequestedSecurityToken" {
                    let span = reader
                        .read_to_end(e.name())
                        .map_err(|err| AuthError::malformed(format!("invalid XML: {err}")))?;
                    let inner = xml
                        .get(span.start as usize..span.end as usize)
                        .ok_or_else(|| AuthError::malformed("token span out of range"))?;
                    raw_token = Some(inner.trim().as_bytes().to_vec());
                } else {
                    path.push(name);
                }
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|err| AuthError::malformed(format!("invalid XML text: {err}")))?
                    .into_owned();
                match path.as_slice() {
                    [.., parent, leaf] if parent == "Lifetime" && leaf == "Expires" => {
                        expires = Some(text);
                    }
                    [.., parent, leaf] if parent == "Fault" && leaf == "faultstring" => {
                        fault_string = Some(text);
                    }
                    [.., parent, leaf] if parent == "Fault" && leaf == "faultcode" => {
                        fault_code = Some(text);
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(AuthError::malformed(format!(
                    "invalid XML at position {}: {err}",
                    reader.error_position()
                )))
            }
        }
    }

    if fault_code.is_some() || fault_string.is_some() {
        let fault = match (fault_code, fault_string) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (Some(only), None) | (None, Some(only)) => only,
            (None, None) => String::new(),
        };
        return Ok(ResponseBody::Fault(fault));
    }

    let raw_token = raw_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AuthError::malformed("response has no RequestedSecurityToken"))?;
    let expires = expires.ok_or_else(|| AuthError::malformed("response has no token lifetime"))?;
    let expires = DateTime::parse_from_rfc3339(expires.trim())
        .map_err(|err| AuthError::malformed(format!("invalid token expiry '{expires}': {err}")))?
        .with_timezone(&Utc);

    Ok(ResponseBody::Token(IssuedToken { raw_token, expires }))
}
