//! In-memory [`StateStorage`] backend.

use crate::error::StorageResult;
use crate::StateStorage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local storage. Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    values: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }
}

#[async_trait]
impl StateStorage for MemoryStorage {
    async fn get_json(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn save_json(&self, key: &str, value: serde_json::Value) -> StorageResult<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}
