//! # Configuration Management
//!
//! Two layers of configuration:
//!
//! - [`StsConfig`]: the tenant's STS endpoint, credentials and region, read
//!   through a [`ConfigProvider`] for every token issuance. [`ConfigStore`]
//!   provides read/write/delete/exists over a [`ConfigStorage`] backend.
//! - [`BrokerSettings`]: process settings (timeouts, TLS verification,
//!   logging) loaded once at startup.

pub mod provider;
pub mod settings;
pub mod storage;
pub mod store;

pub use provider::{validate_service_url, ConfigProvider, StaticConfigProvider, StsConfig};
pub use settings::{BrokerSettings, ObservabilityConfig, ENV_PREFIX};
pub use storage::{ConfigStorage, MemoryStorage};
pub use store::{ConfigStore, ConfigUpdate, ConfigView, WriteMode, CONFIG_STORAGE_KEY};
