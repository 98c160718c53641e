//! Cipher storage, decryption and autofill lookups.

use crate::cache::SortedResultCache;
use crate::decrypt::decrypt_all;
use crate::error::{VaultError, VaultResult};
use crate::lock::{LockListener, VaultLock};
use crate::store::EntityStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyward_crypto::CryptoService;
use keyward_model::uri::base_domain;
use keyward_model::{
    Cipher, CipherLocalData, CipherType, CipherView, Decryptable, Encryptable, UriMatchType,
};
use keyward_storage::{StateStorage, StorageExt};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, warn};

fn local_data_key(user_id: &str) -> String {
    format!("localData_{user_id}")
}

/// Autofill order: most recently used first (dated before undated), then
/// by name ignoring case.
pub fn compare_by_last_used_then_name(a: &CipherView, b: &CipherView) -> Ordering {
    match (a.last_used_date, b.last_used_date) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
}

pub struct CipherService {
    crypto: Arc<dyn CryptoService>,
    storage: Arc<dyn StateStorage>,
    lock: Arc<VaultLock>,
    store: EntityStore<Cipher>,
    sorted_cache: SortedResultCache<CipherView>,
    /// All decrypted ciphers of the unlocked account, built on first use.
    decrypted: Mutex<Option<Vec<CipherView>>>,
    equivalent_domains: RwLock<Vec<HashSet<String>>>,
    default_match: UriMatchType,
}

impl CipherService {
    /// Builds the service and registers it with `lock`.
    pub fn new(
        crypto: Arc<dyn CryptoService>,
        storage: Arc<dyn StateStorage>,
        lock: Arc<VaultLock>,
    ) -> Arc<Self> {
        let config = lock.config().clone();
        let service = Arc::new(Self {
            crypto,
            store: EntityStore::new(storage.clone()),
            storage,
            sorted_cache: SortedResultCache::new(config.cache_ttl()),
            decrypted: Mutex::new(None),
            equivalent_domains: RwLock::new(Vec::new()),
            default_match: config.default_uri_match,
            lock: lock.clone(),
        });
        lock.add_listener(&service);
        service
    }

    // ------------------------------------------------------------------------
    // Encrypted entities
    // ------------------------------------------------------------------------

    /// Stores a synced cipher. A copy older than the stored one is ignored.
    pub async fn upsert(&self, cipher: Cipher) -> VaultResult<bool> {
        let user_id = self.lock.require_authenticated()?;
        let written = self.store.upsert(&user_id, cipher).await?;
        if written {
            self.clear_cache().await;
        }
        Ok(written)
    }

    pub async fn replace_all(&self, ciphers: Vec<Cipher>) -> VaultResult<()> {
        let user_id = self.lock.require_authenticated()?;
        self.store.replace_all(&user_id, ciphers).await?;
        self.clear_cache().await;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> VaultResult<bool> {
        let user_id = self.lock.require_authenticated()?;
        let removed = self.store.delete(&user_id, id).await?;
        if removed {
            let mut local = self.local_data(&user_id).await?;
            if local.remove(id).is_some() {
                self.storage.save(&local_data_key(&user_id), &local).await?;
            }
            self.clear_cache().await;
        }
        Ok(removed)
    }

    pub async fn get(&self, id: &str) -> VaultResult<Option<Cipher>> {
        let user_id = self.lock.require_authenticated()?;
        self.store.get(&user_id, id).await
    }

    /// Clears `folder_id` on every cipher filed in it.
    pub async fn remove_folder(&self, folder_id: &str) -> VaultResult<usize> {
        let user_id = self.lock.require_authenticated()?;
        let moved = self
            .store
            .update_all(&user_id, |cipher| {
                if cipher.folder_id.as_deref() == Some(folder_id) {
                    cipher.folder_id = None;
                    true
                } else {
                    false
                }
            })
            .await?;
        if moved > 0 {
            debug!("[VAULT] Moved {} ciphers out of folder {}", moved, folder_id);
            self.clear_cache().await;
        }
        Ok(moved)
    }

    // ------------------------------------------------------------------------
    // Decryption
    // ------------------------------------------------------------------------

    /// Decrypts a single cipher. Unlike list paths, failures surface.
    pub async fn get_decrypted(&self, id: &str) -> VaultResult<Option<CipherView>> {
        let user_id = self.lock.require_unlocked()?;
        let Some(cipher) = self.store.get(&user_id, id).await? else {
            return Ok(None);
        };
        let key = self.lock.key_for(cipher.organization_id.as_deref())?;
        let mut view = cipher.decrypt(self.crypto.as_ref(), &key).await?;
        if let Some(local) = self.local_data(&user_id).await?.get(id) {
            view.apply_local_data(local);
        }
        Ok(Some(view))
    }

    /// Every cipher of the account, decrypted. Undecryptable ones come back
    /// as flagged placeholders.
    pub async fn get_all_decrypted(&self) -> VaultResult<Vec<CipherView>> {
        let user_id = self.lock.require_unlocked()?;
        let mut decrypted = self.decrypted.lock().await;
        if let Some(views) = decrypted.as_ref() {
            return Ok(views.clone());
        }

        let keys = self.lock.key_ring()?;
        let ciphers = self.store.all(&user_id).await?;
        let mut views = decrypt_all(self.crypto.as_ref(), &ciphers, &keys).await;
        drop(keys);

        let local = self.local_data(&user_id).await?;
        for view in &mut views {
            if let Some(data) = local.get(&view.id) {
                view.apply_local_data(data);
            }
        }

        // A lock that landed mid-decrypt must not see its cache refilled.
        self.ensure_still_unlocked_as(&user_id)?;
        debug!("[VAULT] Decrypted {} ciphers", views.len());
        *decrypted = Some(views.clone());
        Ok(views)
    }

    fn ensure_still_unlocked_as(&self, user_id: &str) -> VaultResult<()> {
        if self.lock.require_unlocked()? != user_id {
            return Err(VaultError::Locked(self.lock.auth_status()));
        }
        Ok(())
    }

    pub async fn encrypt(&self, view: &CipherView) -> VaultResult<Cipher> {
        let key = self.lock.key_for(view.organization_id.as_deref())?;
        Ok(view.encrypt(self.crypto.as_ref(), &key).await?)
    }

    /// Encrypts and stores a view, stamping a new revision date.
    pub async fn save(&self, view: &CipherView) -> VaultResult<Cipher> {
        let user_id = self.lock.require_unlocked()?;
        let mut cipher = self.encrypt(view).await?;
        cipher.revision_date = Utc::now();
        self.store.upsert(&user_id, cipher.clone()).await?;
        self.clear_cache().await;
        Ok(cipher)
    }

    // ------------------------------------------------------------------------
    // URL lookups
    // ------------------------------------------------------------------------

    /// Replaces the account's equivalent-domain groups.
    pub fn set_equivalent_domains(&self, groups: Vec<Vec<String>>) {
        let groups = groups
            .into_iter()
            .map(|g| g.into_iter().map(|d| d.to_lowercase()).collect())
            .collect();
        *self
            .equivalent_domains
            .write()
            .unwrap_or_else(PoisonError::into_inner) = groups;
    }

    fn equivalent_domains_for(&self, url: &str) -> HashSet<String> {
        let Some(domain) = base_domain(url) else {
            return HashSet::new();
        };
        let groups = self
            .equivalent_domains
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        groups
            .iter()
            .filter(|group| group.contains(&domain))
            .flat_map(|group| group.iter().cloned())
            .collect()
    }

    /// Non-deleted logins with a URI matching `url`, unsorted.
    pub async fn get_all_decrypted_for_url(&self, url: &str) -> VaultResult<Vec<CipherView>> {
        let equivalent = self.equivalent_domains_for(url);
        let views = self.get_all_decrypted().await?;
        Ok(views
            .into_iter()
            .filter(|v| {
                !v.is_deleted()
                    && !v.decryption_failed
                    && v.cipher_type == CipherType::Login
                    && v.matches_url(url, &equivalent, self.default_match)
            })
            .collect())
    }

    async fn ensure_url_cached(&self, url: &str) -> VaultResult<()> {
        let user_id = self.lock.require_unlocked()?;
        if self.sorted_cache.is_cached(url).await {
            return Ok(());
        }
        let matches = self.get_all_decrypted_for_url(url).await?;
        self.cache_url_matches(url, &user_id, matches).await
    }

    /// Stores `matches` under `url`, then takes them back out if the vault
    /// locked or changed hands while waiting for the cache.
    async fn cache_url_matches(
        &self,
        url: &str,
        user_id: &str,
        matches: Vec<CipherView>,
    ) -> VaultResult<()> {
        self.sorted_cache
            .add_ciphers(url, matches, compare_by_last_used_then_name)
            .await;
        if let Err(e) = self.ensure_still_unlocked_as(user_id) {
            self.sorted_cache.remove(url).await;
            return Err(e);
        }
        Ok(())
    }

    pub async fn get_last_used_for_url(&self, url: &str) -> VaultResult<Option<CipherView>> {
        self.ensure_url_cached(url).await?;
        Ok(self.sorted_cache.get_last_used(url).await)
    }

    pub async fn get_last_launched_for_url(&self, url: &str) -> VaultResult<Option<CipherView>> {
        self.ensure_url_cached(url).await?;
        Ok(self.sorted_cache.get_last_launched(url).await)
    }

    pub async fn get_next_for_url(&self, url: &str) -> VaultResult<Option<CipherView>> {
        self.ensure_url_cached(url).await?;
        Ok(self.sorted_cache.get_next(url).await)
    }

    /// Moves the autofill cursor for `url` past the current candidate.
    pub async fn update_last_used_index_for_url(&self, url: &str) -> VaultResult<()> {
        self.lock.require_unlocked()?;
        self.sorted_cache.update_last_used_index(url).await;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Local usage data
    // ------------------------------------------------------------------------

    async fn local_data(&self, user_id: &str) -> VaultResult<HashMap<String, CipherLocalData>> {
        Ok(self
            .storage
            .get(&local_data_key(user_id))
            .await?
            .unwrap_or_default())
    }

    async fn update_local_data<F>(&self, id: &str, apply: F) -> VaultResult<()>
    where
        F: Fn(&mut CipherLocalData) + Send + Sync,
    {
        let user_id = self.lock.require_unlocked()?;
        if self.store.get(&user_id, id).await?.is_none() {
            return Err(VaultError::NotFound(format!("cipher {id}")));
        }

        let mut local = self.local_data(&user_id).await?;
        apply(local.entry(id.to_string()).or_default());
        self.storage.save(&local_data_key(&user_id), &local).await?;

        if let Some(views) = self.decrypted.lock().await.as_mut() {
            if let Some(view) = views.iter_mut().find(|v| v.id == id) {
                apply_to_view(view, &apply);
            } else {
                warn!("[VAULT] Cipher {} missing from decrypted cache", id);
            }
        }
        Ok(())
    }

    pub async fn update_last_used_date(&self, id: &str, at: DateTime<Utc>) -> VaultResult<()> {
        self.update_local_data(id, |local| local.last_used_date = Some(at))
            .await
    }

    pub async fn update_last_launched_date(&self, id: &str, at: DateTime<Utc>) -> VaultResult<()> {
        self.update_local_data(id, |local| local.last_launched = Some(at))
            .await
    }

    /// Drops every decrypted view held by this service.
    pub async fn clear_cache(&self) {
        *self.decrypted.lock().await = None;
        self.sorted_cache.clear().await;
    }
}

fn apply_to_view<F: Fn(&mut CipherLocalData)>(view: &mut CipherView, apply: &F) {
    let mut local = CipherLocalData {
        last_used_date: view.last_used_date,
        last_launched: view.last_launched,
    };
    apply(&mut local);
    view.apply_local_data(&local);
}

#[async_trait]
impl LockListener for CipherService {
    async fn on_lock(&self) {
        self.clear_cache().await;
    }

    async fn on_logout(&self, user_id: &str) {
        self.clear_cache().await;
        if let Err(e) = self.store.clear(user_id).await {
            warn!("[VAULT] Failed to evict ciphers of {}: {}", user_id, e);
        }
        if let Err(e) = self.storage.remove(&local_data_key(user_id)).await {
            warn!("[VAULT] Failed to evict local data of {}: {}", user_id, e);
        }
    }
}
