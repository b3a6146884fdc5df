//! Handling for sensitive values that flow through the broker.
//!
//! The STS password and the forged private key are the only secrets the
//! broker touches. Both are wrapped in [`SecretString`] so that structured
//! logging, `Debug` output and serialized configuration views never contain
//! them.

pub mod types;

pub use types::SecretString;
