//! Integration tests for configuration storage and settings loading.

use std::env;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use sts_broker::config::{
    BrokerSettings, ConfigProvider, ConfigStore, ConfigUpdate, MemoryStorage,
    StaticConfigProvider, WriteMode,
};
use sts_broker::errors::ConfigError;
use sts_broker::secrets::SecretString;
use tempfile::NamedTempFile;

// Serializes tests that touch STS_BROKER__* variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn full_update() -> ConfigUpdate {
    ConfigUpdate {
        authentication_url: Some("https://vcenter.example".to_string()),
        api_url: Some("https://vro.example/vco/api".to_string()),
        username: Some("administrator@vsphere.local".to_string()),
        password: Some(SecretString::new("VMware1!")),
        region: Some("us-east-1".to_string()),
    }
}

#[tokio::test]
async fn test_store_lifecycle() {
    let store = ConfigStore::new(MemoryStorage::new());
    assert!(!store.exists().await.unwrap());
    assert!(store.get_config().await.unwrap().is_none());

    store.write(full_update(), WriteMode::Create).await.unwrap();
    assert!(store.exists().await.unwrap());

    let view = store.read().await.unwrap();
    assert_eq!(view.region, "us-east-1");
    assert!(!serde_json::to_string(&view).unwrap().contains("VMware1!"));

    let loaded = store.get_config().await.unwrap().unwrap();
    assert_eq!(loaded.password.expose_secret(), "VMware1!");

    let update = ConfigUpdate { region: Some("eu-west-2".to_string()), ..full_update() };
    store.write(update, WriteMode::Update).await.unwrap();
    assert_eq!(store.read().await.unwrap().region, "eu-west-2");

    store.delete().await.unwrap();
    assert!(!store.exists().await.unwrap());
    assert_eq!(store.read().await.unwrap().region, "");
}

#[tokio::test]
async fn test_update_without_stored_config() {
    let store = ConfigStore::new(MemoryStorage::new());
    let err = store.write(full_update(), WriteMode::Update).await.unwrap_err();

    assert!(matches!(err, ConfigError::NotFoundOnUpdate));
    assert_eq!(err.to_string(), "config not found during update operation");
}

#[tokio::test]
async fn test_write_reports_every_problem() {
    let store = ConfigStore::new(MemoryStorage::new());
    let update = ConfigUpdate {
        authentication_url: Some("ftp://vcenter.example".to_string()),
        api_url: Some("https://".to_string()),
        username: None,
        password: Some(SecretString::new("")),
        region: Some("us-east-1".to_string()),
    };

    match store.write(update, WriteMode::Create).await.unwrap_err() {
        ConfigError::Validation(problems) => assert_eq!(
            problems,
            vec![
                "Username is required".to_string(),
                "Password is required".to_string(),
                "Given API url is not valid url".to_string(),
                "Given authentication url is not valid url".to_string(),
            ]
        ),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert!(!store.exists().await.unwrap());
}

#[tokio::test]
async fn test_static_provider_from_json_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "authentication_url": "vcenter.example",
            "api_url": "https://vro.example/vco/api",
            "username": "administrator@vsphere.local",
            "password": "VMware1!",
            "region": "ap-south-1"
        }}"#
    )
    .unwrap();

    let provider = StaticConfigProvider::from_json_file(file.path()).unwrap();
    let config = provider.get_config().await.unwrap().unwrap();
    assert_eq!(config.region, "ap-south-1");
    assert_eq!(config.password.expose_secret(), "VMware1!");
    assert!(!format!("{config:?}").contains("VMware1!"));
}

#[test]
fn test_static_provider_rejects_invalid_file() {
    let mut file = NamedTempFile::new().unwrap();
    let empty_fields = ["authentication_url", "api_url", "username", "password", "region"]
        .map(|field| format!(r#""{field}": """#))
        .join(", ");
    write!(file, "{{{empty_fields}}}").unwrap();

    let err = StaticConfigProvider::from_json_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn test_settings_from_toml_file() {
    let _guard = ENV_MUTEX.lock().unwrap();

    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
request_timeout_seconds = 12
insecure_skip_verify = true
sts_path = "/custom/sts"

[observability]
log_level = "debug"
json_logging = true
"#
    )
    .unwrap();

    let settings = BrokerSettings::load(Some(file.path())).unwrap();
    assert_eq!(settings.request_timeout(), Duration::from_secs(12));
    assert!(settings.insecure_skip_verify);
    assert_eq!(settings.sts_path, "/custom/sts");
    assert_eq!(settings.observability.log_level, "debug");
    assert!(settings.observability.json_logging);
    assert_eq!(settings.observability.service_name, "sts-broker");

    let client = settings.sts_client_config();
    assert_eq!(client.request_timeout, Duration::from_secs(12));
    assert_eq!(client.sts_path, "/custom/sts");
}

#[test]
fn test_settings_reject_out_of_range_timeout() {
    let _guard = ENV_MUTEX.lock().unwrap();

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "request_timeout_seconds = 0").unwrap();

    assert!(BrokerSettings::load(Some(file.path())).is_err());
}

#[test]
fn test_environment_overrides_settings() {
    let _guard = ENV_MUTEX.lock().unwrap();

    let original = env::var("STS_BROKER__REQUEST_TIMEOUT_SECONDS").ok();
    env::set_var("STS_BROKER__REQUEST_TIMEOUT_SECONDS", "45");
    env::set_var("STS_BROKER__OBSERVABILITY__LOG_LEVEL", "warn");

    let settings = BrokerSettings::load(None);

    match original {
        Some(value) => env::set_var("STS_BROKER__REQUEST_TIMEOUT_SECONDS", value),
        None => env::remove_var("STS_BROKER__REQUEST_TIMEOUT_SECONDS"),
    }
    env::remove_var("STS_BROKER__OBSERVABILITY__LOG_LEVEL");

    let settings = settings.unwrap();
    assert_eq!(settings.request_timeout_seconds, 45);
    assert_eq!(settings.observability.log_level, "warn");
    assert_eq!(settings.sts_path, "/sts/STSService");
}
