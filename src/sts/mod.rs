//! # STS Client
//!
//! Exchanges a forged client certificate plus a username/password identity
//! for a delegable SAML token over SOAP/TLS.
//!
//! Each exchange walks `Idle -> SessionEstablishing -> CertificateAuthenticating
//! -> TokenRequested -> TokenIssued | Failed`. Nothing is kept between calls and
//! nothing is retried here; retry policy belongs to the caller.

pub mod envelope;

use std::fmt;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use reqwest::{header, Client, Identity};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::StsConfig;
use crate::errors::AuthError;
use crate::forge::{token_lifetime, Certificate, ForgedIdentity, KeyPair};
use crate::secrets::SecretString;

use envelope::ResponseBody;

/// Path used when the configured endpoint has none.
pub const DEFAULT_STS_PATH: &str = "/sts/STSService";

/// Default bound on one STS round trip.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Session options for the STS client.
#[derive(Debug, Clone)]
pub struct StsClientConfig {
    pub request_timeout: StdDuration,
    /// Disables verification of the STS server certificate. Off unless
    /// explicitly configured.
    pub insecure_skip_verify: bool,
    pub sts_path: String,
}

impl Default for StsClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: StdDuration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            insecure_skip_verify: false,
            sts_path: DEFAULT_STS_PATH.to_string(),
        }
    }
}

/// Parsed STS endpoint. Never carries credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Parse the configured authentication URL.
    ///
    /// A bare `host[:port][/path]` is treated as `https://`. Only http and
    /// https are accepted. An empty path becomes `default_path`, and any
    /// userinfo embedded in the URL is dropped.
    pub fn parse(raw: &str, default_path: &str) -> Result<Self, AuthError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AuthError::invalid_endpoint(raw, "endpoint is empty"));
        }

        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };

        let mut url = Url::parse(&candidate).map_err(|e| AuthError::invalid_endpoint(raw, e))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(AuthError::invalid_endpoint(
                raw,
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(AuthError::invalid_endpoint(raw, "missing host"));
        }

        if url.path().is_empty() || url.path() == "/" {
            url.set_path(default_path);
        }

        // Credentials travel in the WS-Security header, never as HTTP Basic auth.
        let _ = url.set_username("");
        let _ = url.set_password(None);

        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Username/password identity bound to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub username: String,
    pub password: SecretString,
}

impl UserInfo {
    pub fn new(username: impl Into<String>, password: impl Into<SecretString>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

/// One Issue request. `key_pair` signs the message and must belong to
/// `certificate`.
#[derive(Debug, Clone)]
pub struct TokenRequest<'a> {
    pub certificate: &'a Certificate,
    pub key_pair: &'a KeyPair,
    pub delegatable: bool,
    pub identity: UserInfo,
    pub lifetime: Duration,
}

impl<'a> TokenRequest<'a> {
    /// Delegable request for the standard token lifetime.
    pub fn new(certificate: &'a Certificate, key_pair: &'a KeyPair, identity: UserInfo) -> Self {
        Self { certificate, key_pair, delegatable: true, identity, lifetime: token_lifetime() }
    }
}

/// Token returned by the STS: the raw SAML assertion and when it expires.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub raw_token: Vec<u8>,
    pub expires: DateTime<Utc>,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("raw_token", &format!("[{} bytes]", self.raw_token.len()))
            .field("expires", &self.expires)
            .finish()
    }
}

/// Exchange progress, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    SessionEstablishing,
    CertificateAuthenticating,
    TokenRequested,
    TokenIssued,
    Failed,
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeState::Idle => "idle",
            ExchangeState::SessionEstablishing => "session_establishing",
            ExchangeState::CertificateAuthenticating => "certificate_authenticating",
            ExchangeState::TokenRequested => "token_requested",
            ExchangeState::TokenIssued => "token_issued",
            ExchangeState::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl ExchangeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExchangeState::TokenIssued | ExchangeState::Failed)
    }
}

#[derive(Debug)]
struct Exchange {
    state: ExchangeState,
}

impl Exchange {
    fn start() -> Self {
        Self { state: ExchangeState::Idle }
    }

    fn advance(&mut self, next: ExchangeState) {
        debug!(from = %self.state, to = %next, "STS exchange state change");
        self.state = next;
    }

    fn fail(&mut self, error: AuthError) -> AuthError {
        debug!(from = %self.state, error = %error, "STS exchange failed");
        self.state = ExchangeState::Failed;
        error
    }
}

/// HTTP session to one STS endpoint, presenting a forged client identity.
#[derive(Debug)]
pub struct StsClient {
    endpoint: Endpoint,
    http: Client,
    request_timeout: StdDuration,
}

impl StsClient {
    /// Build a session for `endpoint` using `identity` as the TLS client
    /// certificate.
    pub fn new(
        endpoint: Endpoint,
        identity: &ForgedIdentity,
        config: &StsClientConfig,
    ) -> Result<Self, AuthError> {
        let pem = identity
            .client_identity_pem()
            .map_err(|e| AuthError::session_failed(format!("client identity export: {e}")))?;
        let tls_identity = Identity::from_pem(pem.expose_secret().as_bytes())
            .map_err(|e| AuthError::session_failed(format!("client identity rejected: {e}")))?;

        if config.insecure_skip_verify {
            warn!(
                endpoint = %endpoint,
                "STS server certificate verification is disabled by configuration"
            );
        }

        let http = Client::builder()
            .use_rustls_tls()
            .identity(tls_identity)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::session_failed(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { endpoint, http, request_timeout: config.request_timeout })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Submit one Issue request. Aborts with [`AuthError::Cancelled`] as soon
    /// as `cancel` fires.
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    pub async fn issue(
        &self,
        request: &TokenRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<IssuedToken, AuthError> {
        let mut exchange = Exchange::start();
        exchange.advance(ExchangeState::SessionEstablishing);
        self.run(request, cancel, exchange).await
    }

    async fn run(
        &self,
        request: &TokenRequest<'_>,
        cancel: &CancellationToken,
        mut exchange: Exchange,
    ) -> Result<IssuedToken, AuthError> {
        exchange.advance(ExchangeState::CertificateAuthenticating);

        let body = envelope::issue_request(request, request.certificate.not_before())
            .map_err(|e| exchange.fail(e))?;

        exchange.advance(ExchangeState::TokenRequested);
        let started = Instant::now();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
            result = self.round_trip(body) => result,
        };

        match outcome {
            Ok(token) => {
                exchange.advance(ExchangeState::TokenIssued);
                debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    expires = %token.expires,
                    "STS token issued"
                );
                Ok(token)
            }
            Err(e) => Err(exchange.fail(e)),
        }
    }

    async fn round_trip(&self, body: String) -> Result<IssuedToken, AuthError> {
        let response = self
            .http
            .post(self.endpoint.url().clone())
            .header(header::CONTENT_TYPE, envelope::CONTENT_TYPE)
            .header("SOAPAction", envelope::SOAP_ACTION_ISSUE)
            .body(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        match envelope::parse_response(&text) {
            Ok(ResponseBody::Fault(fault)) => Err(AuthError::fault(fault)),
            Ok(ResponseBody::Token(token)) if status.is_success() => Ok(token),
            Err(e) if status.is_success() => Err(e),
            _ => Err(AuthError::issue_failed(format!("STS returned HTTP {status}"))),
        }
    }

    fn transport_error(&self, error: reqwest::Error) -> AuthError {
        if error.is_timeout() {
            AuthError::Timeout { timeout_ms: self.request_timeout.as_millis() as u64 }
        } else {
            AuthError::issue_failed(error)
        }
    }
}

/// Run a full exchange for `config` with a freshly forged identity.
#[instrument(skip_all, fields(region = %config.region))]
pub async fn issue_token(
    config: &StsConfig,
    identity: &ForgedIdentity,
    client_config: &StsClientConfig,
    cancel: &CancellationToken,
) -> Result<IssuedToken, AuthError> {
    let mut exchange = Exchange::start();
    exchange.advance(ExchangeState::SessionEstablishing);

    let endpoint = Endpoint::parse(&config.authentication_url, &client_config.sts_path)
        .map_err(|e| exchange.fail(e))?;
    let client =
        StsClient::new(endpoint, identity, client_config).map_err(|e| exchange.fail(e))?;

    let request = TokenRequest::new(
        &identity.certificate,
        &identity.key_pair,
        UserInfo::new(config.username.clone(), config.password.clone()),
    );

    client.run(&request, cancel, exchange).await
}
