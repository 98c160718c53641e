//! Sends of the active account, each sealed under its own send key.

use crate::decrypt::decrypt_all;
use crate::error::VaultResult;
use crate::lock::{LockListener, VaultLock};
use crate::store::EntityStore;
use async_trait::async_trait;
use chrono::Utc;
use keyward_crypto::CryptoService;
use keyward_model::send::{self, SendView};
use keyward_model::Encryptable;
use keyward_storage::StateStorage;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Sends of the active account. Each send's key is wrapped with the user key.
pub struct SendService {
    crypto: Arc<dyn CryptoService>,
    lock: Arc<VaultLock>,
    store: EntityStore<send::Send>,
    decrypted: Mutex<Option<Vec<SendView>>>,
}

impl SendService {
    pub fn new(
        crypto: Arc<dyn CryptoService>,
        storage: Arc<dyn StateStorage>,
        lock: Arc<VaultLock>,
    ) -> Arc<Self> {
        let service = Arc::new(Self {
            crypto,
            store: EntityStore::new(storage),
            lock: lock.clone(),
            decrypted: Mutex::new(None),
        });
        lock.add_listener(&service);
        service
    }

    pub async fn upsert(&self, item: send::Send) -> VaultResult<bool> {
        let user_id = self.lock.require_authenticated()?;
        let written = self.store.upsert(&user_id, item).await?;
        if written {
            self.clear_cache().await;
        }
        Ok(written)
    }

    pub async fn replace_all(&self, items: Vec<send::Send>) -> VaultResult<()> {
        let user_id = self.lock.require_authenticated()?;
        self.store.replace_all(&user_id, items).await?;
        self.clear_cache().await;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> VaultResult<bool> {
        let user_id = self.lock.require_authenticated()?;
        let removed = self.store.delete(&user_id, id).await?;
        if removed {
            self.clear_cache().await;
        }
        Ok(removed)
    }

    pub async fn get(&self, id: &str) -> VaultResult<Option<send::Send>> {
        let user_id = self.lock.require_authenticated()?;
        self.store.get(&user_id, id).await
    }

    pub async fn get_all_decrypted(&self) -> VaultResult<Vec<SendView>> {
        let user_id = self.lock.require_unlocked()?;
        let mut decrypted = self.decrypted.lock().await;
        if let Some(views) = decrypted.as_ref() {
            return Ok(views.clone());
        }

        let keys = self.lock.key_ring()?;
        let items = self.store.all(&user_id).await?;
        let views = decrypt_all(self.crypto.as_ref(), &items, &keys).await;
        drop(keys);

        self.lock.require_unlocked()?;
        *decrypted = Some(views.clone());
        Ok(views)
    }

    /// Encrypts a view; a send without a key gets a fresh one.
    pub async fn encrypt(&self, view: &SendView) -> VaultResult<send::Send> {
        let key = self.lock.user_key()?;
        Ok(view.encrypt(self.crypto.as_ref(), &key).await?)
    }

    pub async fn save(&self, view: &SendView) -> VaultResult<send::Send> {
        let user_id = self.lock.require_unlocked()?;
        let mut item = self.encrypt(view).await?;
        item.revision_date = Utc::now();
        self.store.upsert(&user_id, item.clone()).await?;
        self.clear_cache().await;
        Ok(item)
    }

    pub async fn clear_cache(&self) {
        *self.decrypted.lock().await = None;
    }
}

#[async_trait]
impl LockListener for SendService {
    async fn on_lock(&self) {
        self.clear_cache().await;
    }

    async fn on_logout(&self, user_id: &str) {
        self.clear_cache().await;
        if let Err(e) = self.store.clear(user_id).await {
            warn!("[VAULT] Failed to evict sends of {}: {}", user_id, e);
        }
    }
}
