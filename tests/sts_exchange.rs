//! End-to-end token reads against a mock Security Token Service.

use std::io::Read;
use std::net::TcpListener;
use std::time::Duration as StdDuration;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{TimeZone, Utc};
use flate2::read::GzDecoder;
use sts_broker::config::{StaticConfigProvider, StsConfig};
use sts_broker::errors::{AuthError, Error, TOKEN_ACQUISITION_FAILED};
use sts_broker::secrets::SecretString;
use sts_broker::sts::{envelope, StsClientConfig, DEFAULT_STS_PATH};
use sts_broker::TokenBackend;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ASSERTION: &str = r#"<saml2:Assertion xmlns:saml2="urn:oasis:names:tc:SAML:2.0:assertion" ID="_8f3c" IssueInstant="2024-01-01T00:00:00.000Z" Version="2.0"><saml2:Issuer>https://vcenter.example/websso/SAML2/Metadata/vsphere.local</saml2:Issuer><saml2:Subject><saml2:NameID>administrator@vsphere.local</saml2:NameID></saml2:Subject></saml2:Assertion>"#;

fn token_response() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/">
  <S:Body>
    <wst:RequestSecurityTokenResponseCollection xmlns:wst="http://docs.oasis-open.org/ws-sx/ws-trust/200512">
      <wst:RequestSecurityTokenResponse>
        <wst:Lifetime>
          <wsu:Created xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">2024-01-01T00:00:00.000Z</wsu:Created>
          <wsu:Expires xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">2024-01-04T00:00:00.000Z</wsu:Expires>
        </wst:Lifetime>
        <wst:RequestedSecurityToken>
          {ASSERTION}
        </wst:RequestedSecurityToken>
      </wst:RequestSecurityTokenResponse>
    </wst:RequestSecurityTokenResponseCollection>
  </S:Body>
</S:Envelope>"#
    )
}

const FAULT_RESPONSE: &str = r#"<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/">
  <S:Body>
    <S:Fault>
      <faultcode xmlns:ns0="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd">ns0:FailedAuthentication</faultcode>
      <faultstring>Invalid credentials</faultstring>
    </S:Fault>
  </S:Body>
</S:Envelope>"#;

fn sts_config(authentication_url: String) -> StsConfig {
    StsConfig {
        authentication_url,
        api_url: "https://vro.example/vco/api".to_string(),
        username: "administrator@vsphere.local".to_string(),
        password: SecretString::new("VMware1!"),
        region: "us-east-1".to_string(),
    }
}

fn client_config(request_timeout: StdDuration) -> StsClientConfig {
    StsClientConfig { request_timeout, ..Default::default() }
}

fn backend(url: String, timeout: StdDuration) -> TokenBackend<StaticConfigProvider> {
    TokenBackend::with_client_config(
        StaticConfigProvider::new(sts_config(url)),
        client_config(timeout),
    )
}

fn unpack(token: &str) -> String {
    let compressed = STANDARD.decode(token).expect("base64 token");
    let mut raw = String::new();
    GzDecoder::new(compressed.as_slice()).read_to_string(&mut raw).expect("gzip token");
    raw
}

#[traced_test]
#[tokio::test]
async fn test_token_read_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEFAULT_STS_PATH))
        .and(header("SOAPAction", envelope::SOAP_ACTION_ISSUE))
        .and(body_string_contains("wsse:BinarySecurityToken"))
        .and(body_string_contains("administrator@vsphere.local"))
        .respond_with(ResponseTemplate::new(200).set_body_string(token_response()))
        .expect(1)
        .mount(&server)
        .await;

    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let response = backend(server.uri(), StdDuration::from_secs(5))
        .read_token_at(now)
        .await
        .expect("token read should succeed");

    assert_eq!(response.expires, "2024-01-04T00:00:00.000Z");
    assert_eq!(unpack(&response.token), ASSERTION);
    assert_eq!(response.signature.len(), 256);
    assert!(logs_contain("Token packaged"));
    assert!(logs_contain("Token issued"));
}

#[tokio::test]
async fn test_request_carries_certificate_and_lifetime() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(token_response()))
        .mount(&server)
        .await;

    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    backend(server.uri(), StdDuration::from_secs(5)).read_token_at(now).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body = String::from_utf8(requests[0].body.clone()).unwrap();

    assert!(body.contains("<wsu:Created>2024-01-01T00:00:00.000Z</wsu:Created>"));
    assert!(body.contains("<wsu:Expires>2024-01-04T00:00:00.000Z</wsu:Expires>"));
    assert!(body.contains("<wst:Delegatable>true</wst:Delegatable>"));
    assert!(body.contains("VMware1!"));
    assert!(body.contains(r##"<wst:UseKey Sig="#Signature"></wst:UseKey>"##));
    assert!(body.contains("<ds:SignatureValue>"));
    assert!(body.contains(r##"<wsse:Reference URI="#Certificate""##));
}

#[tokio::test]
async fn test_each_read_forges_a_new_identity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(token_response()))
        .expect(2)
        .mount(&server)
        .await;

    let backend = backend(server.uri(), StdDuration::from_secs(5));
    let first = backend.read_token().await.unwrap();
    let second = backend.read_token().await.unwrap();

    assert_ne!(first.signature, second.signature);
}

#[tokio::test]
async fn test_soap_fault_is_reported_with_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string(FAULT_RESPONSE))
        .mount(&server)
        .await;

    let backend = backend(server.uri(), StdDuration::from_secs(5));
    let err = backend.issue_detailed(Utc::now(), &CancellationToken::new()).await.unwrap_err();

    match err {
        Error::Auth(AuthError::Fault { fault }) => {
            assert_eq!(fault, "ns0:FailedAuthentication: Invalid credentials");
        }
        other => panic!("expected SOAP fault, got {other:?}"),
    }

    assert_eq!(backend.read_token().await.unwrap_err().to_string(), TOKEN_ACQUISITION_FAILED);
}

#[tokio::test]
async fn test_http_error_without_fault() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let err = backend(server.uri(), StdDuration::from_secs(5))
        .issue_detailed(Utc::now(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::IssueFailed { .. })));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_malformed_success_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<S:Envelope/>"))
        .mount(&server)
        .await;

    let err = backend(server.uri(), StdDuration::from_secs(5))
        .issue_detailed(Utc::now(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::MalformedResponse { .. })));
}

#[traced_test]
#[tokio::test]
async fn test_unreachable_sts_yields_generic_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let backend = backend(format!("http://127.0.0.1:{port}"), StdDuration::from_secs(5));
    let err = backend.read_token().await.unwrap_err();

    assert_eq!(err.to_string(), TOKEN_ACQUISITION_FAILED);
    assert!(logs_contain("Token acquisition failed"));
    assert!(logs_contain("to=token_requested"));
    assert!(!logs_contain("to=token_issued"));
    assert!(!logs_contain("Token packaged"));
    assert!(!logs_contain("Token issued"));
    assert!(!logs_contain("VMware1!"));
}

#[tokio::test]
async fn test_invalid_endpoint_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(token_response()))
        .expect(0)
        .mount(&server)
        .await;

    let err = backend("::::".to_string(), StdDuration::from_secs(5))
        .issue_detailed(Utc::now(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::InvalidEndpoint { .. })));
}

#[tokio::test]
async fn test_request_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(token_response())
                .set_delay(StdDuration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = backend(server.uri(), StdDuration::from_millis(200))
        .issue_detailed(Utc::now(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::Timeout { timeout_ms: 200 })));
}

#[tokio::test]
async fn test_cancellation_aborts_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(token_response())
                .set_delay(StdDuration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let backend = backend(server.uri(), StdDuration::from_secs(30));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(StdDuration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = backend.issue_detailed(Utc::now(), &cancel).await.unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::Cancelled)));
    assert!(started.elapsed() < StdDuration::from_secs(10));
}
