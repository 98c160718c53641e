//! Vault core for Keyward.
//!
//! Gates every path to plaintext behind the [`VaultLock`] state machine and
//! keeps decrypted views strictly in memory:
//! - [`VaultLock`]: `LoggedOut` / `Locked` / `Unlocked`, the key ring and
//!   timeout enforcement
//! - [`SortedResultCache`]: TTL-bounded, cursor-rotating autofill results
//! - [`CipherService`], [`FolderService`], [`SendService`]: persisted
//!   encrypted entities and their decrypted views
//!
//! [`Vault`] wires these together over one storage backend and one
//! [`CryptoService`].

pub mod cache;
pub mod ciphers;
pub mod config;
pub mod decrypt;
pub mod error;
pub mod folders;
pub mod lock;
pub mod sends;
pub mod store;
pub mod timeout;

pub use cache::{LaunchTracked, SortedResultCache};
pub use ciphers::CipherService;
pub use config::VaultConfig;
pub use decrypt::decrypt_all;
pub use error::{VaultError, VaultResult};
pub use folders::FolderService;
pub use lock::{AuthStatus, KeyRing, LockListener, LockReason, SystemEvent, VaultLock};
pub use sends::SendService;
pub use store::EntityStore;
pub use timeout::{MaximumTimeoutPolicy, TimeoutSettings, VaultTimeout, VaultTimeoutAction};

use keyward_crypto::CryptoService;
use keyward_storage::{DuckDbStorage, StateStorage};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// The assembled vault core for one process.
pub struct Vault {
    pub lock: Arc<VaultLock>,
    pub ciphers: Arc<CipherService>,
    pub folders: Arc<FolderService>,
    pub sends: Arc<SendService>,
}

impl Vault {
    /// Loads lock state from `storage` and builds the services.
    pub async fn open(
        config: VaultConfig,
        crypto: Arc<dyn CryptoService>,
        storage: Arc<dyn StateStorage>,
    ) -> VaultResult<Self> {
        let lock = Arc::new(VaultLock::load(storage.clone(), config).await?);
        let ciphers = CipherService::new(crypto.clone(), storage.clone(), lock.clone());
        let folders = FolderService::new(
            crypto.clone(),
            storage.clone(),
            lock.clone(),
            ciphers.clone(),
        );
        let sends = SendService::new(crypto, storage, lock.clone());
        info!("[VAULT] Opened with status {}", lock.auth_status());
        Ok(Self {
            lock,
            ciphers,
            folders,
            sends,
        })
    }

    /// Opens a vault backed by a DuckDB state file.
    pub async fn open_duckdb(
        path: &Path,
        config: VaultConfig,
        crypto: Arc<dyn CryptoService>,
    ) -> VaultResult<Self> {
        let storage = DuckDbStorage::open(path, &config.duckdb_memory_limit, config.duckdb_threads)?;
        Self::open(config, crypto, Arc::new(storage)).await
    }

    pub fn auth_status(&self) -> AuthStatus {
        self.lock.auth_status()
    }
}
