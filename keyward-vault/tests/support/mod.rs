//! Shared helpers for vault integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use keyward_crypto::{
    AesCryptoService, CryptoError, CryptoResult, CryptoService, EncodedValue, SymmetricKeyMaterial,
};
use keyward_model::{CipherType, CipherView, LoginUriView};
use keyward_storage::{MemoryStorage, StateStorage, StorageError, StorageResult};
use keyward_vault::{KeyRing, Vault, VaultConfig};
use std::sync::Arc;

pub const USER: &str = "user-1";

/// AES service whose "private key" path is symmetric: the private key bytes
/// are used as a 64-byte symmetric key. Lets tests exercise organization and
/// provider key unwrapping without RSA.
#[derive(Default)]
pub struct FakeAsymmetricCrypto {
    inner: AesCryptoService,
}

#[async_trait]
impl CryptoService for FakeAsymmetricCrypto {
    async fn encrypt(
        &self,
        plaintext: &[u8],
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<EncodedValue> {
        self.inner.encrypt(plaintext, key).await
    }

    async fn decrypt(
        &self,
        value: &EncodedValue,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<Vec<u8>> {
        self.inner.decrypt(value, key).await
    }

    async fn decrypt_with_private_key(
        &self,
        value: &EncodedValue,
        private_key: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let key = SymmetricKeyMaterial::from_bytes(private_key.to_vec())
            .map_err(|_| CryptoError::Decryption)?;
        self.inner.decrypt(value, &key).await
    }
}

/// Memory storage whose `remove` fails for one key.
pub struct FailingRemoveStorage {
    pub inner: MemoryStorage,
    fail_key: &'static str,
}

impl FailingRemoveStorage {
    pub fn new(fail_key: &'static str) -> Self {
        Self {
            inner: MemoryStorage::new(),
            fail_key,
        }
    }
}

#[async_trait]
impl StateStorage for FailingRemoveStorage {
    async fn get_json(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        self.inner.get_json(key).await
    }

    async fn save_json(&self, key: &str, value: serde_json::Value) -> StorageResult<()> {
        self.inner.save_json(key, value).await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        if key == self.fail_key {
            return Err(StorageError::Poisoned("disk gone".into()));
        }
        self.inner.remove(key).await
    }
}

pub struct Harness {
    pub vault: Vault,
    pub storage: Arc<MemoryStorage>,
    pub crypto: Arc<FakeAsymmetricCrypto>,
    pub user_key: SymmetricKeyMaterial,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new())).await
    }

    pub async fn with_storage(storage: Arc<MemoryStorage>) -> Self {
        let crypto = Arc::new(FakeAsymmetricCrypto::default());
        let vault = Vault::open(VaultConfig::default(), crypto.clone(), storage.clone())
            .await
            .unwrap();
        Self {
            vault,
            storage,
            crypto,
            user_key: SymmetricKeyMaterial::generate(),
        }
    }

    pub fn key_ring(&self) -> KeyRing {
        KeyRing::new(self.user_key.clone())
    }

    pub async fn logged_in() -> Self {
        let harness = Self::new().await;
        harness
            .vault
            .lock
            .log_in(USER, harness.key_ring())
            .await
            .unwrap();
        harness
    }
}

pub fn login(name: &str, uri: &str) -> CipherView {
    let mut view = CipherView::new(CipherType::Login, name);
    if let Some(login) = view.login.as_mut() {
        login.username = Some(format!("{name}@example.com"));
        login.uris.push(LoginUriView::new(uri));
    }
    view
}

/// Routes `tracing` output through the test writer when `RUST_LOG` is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
