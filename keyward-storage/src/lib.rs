//! State storage for Keyward.
//!
//! The vault core persists encrypted entity lists, per-item local data,
//! the active-account flag and timeout settings through the async
//! [`StateStorage`] key/value boundary. Values are JSON documents.
//!
//! # Backends
//!
//! - [`MemoryStorage`]: process-local map, used by tests and ephemeral clients
//! - [`DuckDbStorage`]: a single `state` table in a DuckDB file

mod duckdb_store;
mod error;
mod memory;

pub use duckdb_store::DuckDbStorage;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStorage;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Async key/value storage boundary.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Reads a value. `None` when the key is absent.
    async fn get_json(&self, key: &str) -> StorageResult<Option<serde_json::Value>>;

    /// Writes (replaces) a value.
    async fn save_json(&self, key: &str, value: serde_json::Value) -> StorageResult<()>;

    /// Removes a value. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> StorageResult<()>;

    async fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get_json(key).await?.is_some())
    }
}

/// Typed helpers over any [`StateStorage`].
#[async_trait]
pub trait StorageExt: StateStorage {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.get_json(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn save<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> StorageResult<()> {
        let json = serde_json::to_value(value)?;
        self.save_json(key, json).await
    }
}

impl<S: StateStorage + ?Sized> StorageExt for S {}
