//! # STS Broker
//!
//! Issues short-lived delegated security tokens. Every token read forges a
//! fresh self-signed client certificate bound to the tenant's region, uses it
//! (together with a username/password identity) to authenticate a WS-Trust
//! Issue request at a Security Token Service, and packages the returned token
//! for transport.
//!
//! ## Architecture
//!
//! ```text
//! ConfigProvider → Certificate Forge → STS Client → Token Packager → caller
//!                        ↓                  ↓
//!               key + cert + signature   raw token + expiry
//! ```
//!
//! ## Core Components
//!
//! - **Certificate Forge** ([`forge`]): RSA key, 128-bit serial, region in
//!   the subject alternative name, detached signature over a fixed payload
//! - **STS Client** ([`sts`]): SOAP/TLS session with the forged certificate
//!   as client identity
//! - **Token Packager** ([`packager`]): gzip + base64 token, formatted expiry
//! - **Token Backend** ([`backend`]): the read pipeline and the opaque
//!   caller-facing error
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sts_broker::{BrokerSettings, StaticConfigProvider, TokenBackend};
//! # async fn run(config: sts_broker::StsConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let settings = BrokerSettings::load(None)?;
//! let backend = TokenBackend::new(StaticConfigProvider::new(config), &settings);
//! let response = backend.read_token().await?;
//! println!("{}", response.expires);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod errors;
pub mod forge;
pub mod observability;
pub mod packager;
pub mod secrets;
pub mod sts;

// Re-export commonly used types and traits
pub use backend::TokenBackend;
pub use config::{BrokerSettings, ConfigProvider, StaticConfigProvider, StsConfig};
pub use errors::{Error, Result, TokenAcquisitionError};
pub use forge::{forge, ForgedIdentity};
pub use packager::{package, PackagedResponse};
pub use sts::{issue_token, IssuedToken};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
