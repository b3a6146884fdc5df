//! Key-value storage behind the configuration store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::ConfigError;

/// Raw entry storage. Values are opaque JSON documents.
#[async_trait]
pub trait ConfigStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ConfigError>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), ConfigError>;

    /// Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), ConfigError>;
}

/// Process-local storage. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ConfigStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ConfigError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), ConfigError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ConfigError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
