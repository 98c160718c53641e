//! Folders of the active account.

use crate::ciphers::CipherService;
use crate::decrypt::decrypt_all;
use crate::error::VaultResult;
use crate::lock::{LockListener, VaultLock};
use crate::store::EntityStore;
use async_trait::async_trait;
use chrono::Utc;
use keyward_crypto::CryptoService;
use keyward_model::{Encryptable, Folder, FolderView};
use keyward_storage::StateStorage;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

pub struct FolderService {
    crypto: Arc<dyn CryptoService>,
    lock: Arc<VaultLock>,
    store: EntityStore<Folder>,
    ciphers: Arc<CipherService>,
    decrypted: Mutex<Option<Vec<FolderView>>>,
}

impl FolderService {
    pub fn new(
        crypto: Arc<dyn CryptoService>,
        storage: Arc<dyn StateStorage>,
        lock: Arc<VaultLock>,
        ciphers: Arc<CipherService>,
    ) -> Arc<Self> {
        let service = Arc::new(Self {
            crypto,
            store: EntityStore::new(storage),
            lock: lock.clone(),
            ciphers,
            decrypted: Mutex::new(None),
        });
        lock.add_listener(&service);
        service
    }

    pub async fn upsert(&self, folder: Folder) -> VaultResult<bool> {
        let user_id = self.lock.require_authenticated()?;
        let written = self.store.upsert(&user_id, folder).await?;
        if written {
            self.clear_cache().await;
        }
        Ok(written)
    }

    pub async fn replace_all(&self, folders: Vec<Folder>) -> VaultResult<()> {
        let user_id = self.lock.require_authenticated()?;
        self.store.replace_all(&user_id, folders).await?;
        self.clear_cache().await;
        Ok(())
    }

    /// Deletes the folder and files its ciphers under "no folder".
    pub async fn delete(&self, id: &str) -> VaultResult<bool> {
        let user_id = self.lock.require_authenticated()?;
        let removed = self.store.delete(&user_id, id).await?;
        if removed {
            self.ciphers.remove_folder(id).await?;
            self.clear_cache().await;
        }
        Ok(removed)
    }

    /// Folders sorted by name, ignoring case.
    pub async fn get_all_decrypted(&self) -> VaultResult<Vec<FolderView>> {
        let user_id = self.lock.require_unlocked()?;
        let mut decrypted = self.decrypted.lock().await;
        if let Some(views) = decrypted.as_ref() {
            return Ok(views.clone());
        }

        let keys = self.lock.key_ring()?;
        let folders = self.store.all(&user_id).await?;
        let mut views = decrypt_all(self.crypto.as_ref(), &folders, &keys).await;
        drop(keys);
        views.sort_by_key(|v| v.name.to_lowercase());

        self.lock.require_unlocked()?;
        *decrypted = Some(views.clone());
        Ok(views)
    }

    pub async fn encrypt(&self, view: &FolderView) -> VaultResult<Folder> {
        let key = self.lock.user_key()?;
        Ok(view.encrypt(self.crypto.as_ref(), &key).await?)
    }

    pub async fn save(&self, view: &FolderView) -> VaultResult<Folder> {
        let user_id = self.lock.require_unlocked()?;
        let mut folder = self.encrypt(view).await?;
        folder.revision_date = Utc::now();
        self.store.upsert(&user_id, folder.clone()).await?;
        self.clear_cache().await;
        Ok(folder)
    }

    pub async fn clear_cache(&self) {
        *self.decrypted.lock().await = None;
    }
}

#[async_trait]
impl LockListener for FolderService {
    async fn on_lock(&self) {
        self.clear_cache().await;
    }

    async fn on_logout(&self, user_id: &str) {
        self.clear_cache().await;
        if let Err(e) = self.store.clear(user_id).await {
            warn!("[VAULT] Failed to evict folders of {}: {}", user_id, e);
        }
    }
}
