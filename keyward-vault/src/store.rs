//! Per-user persisted maps of encrypted entities.

use crate::error::VaultResult;
use keyward_model::VaultEntity;
use keyward_storage::{StateStorage, StorageExt};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Stores entities of one kind under `"<kind>_<user_id>"` as an id-keyed map.
pub struct EntityStore<E> {
    storage: Arc<dyn StateStorage>,
    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: VaultEntity> EntityStore<E> {
    pub fn new(storage: Arc<dyn StateStorage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
            _entity: PhantomData,
        }
    }

    fn key(user_id: &str) -> String {
        format!("{}_{}", E::KIND, user_id)
    }

    async fn load(&self, user_id: &str) -> VaultResult<BTreeMap<String, E>> {
        Ok(self
            .storage
            .get::<BTreeMap<String, E>>(&Self::key(user_id))
            .await?
            .unwrap_or_default())
    }

    async fn store(&self, user_id: &str, map: &BTreeMap<String, E>) -> VaultResult<()> {
        self.storage.save(&Self::key(user_id), map).await?;
        Ok(())
    }

    /// All entities, ordered by id.
    pub async fn all(&self, user_id: &str) -> VaultResult<Vec<E>> {
        Ok(self.load(user_id).await?.into_values().collect())
    }

    pub async fn get(&self, user_id: &str, id: &str) -> VaultResult<Option<E>> {
        Ok(self.load(user_id).await?.remove(id))
    }

    /// Replaces the whole set, e.g. after a full sync.
    pub async fn replace_all(&self, user_id: &str, entities: Vec<E>) -> VaultResult<()> {
        let _guard = self.write_lock.lock().await;
        let map: BTreeMap<String, E> = entities
            .into_iter()
            .map(|e| (e.id().to_string(), e))
            .collect();
        debug!("[STORE] Replacing {} {} for {}", map.len(), E::KIND, user_id);
        self.store(user_id, &map).await
    }

    /// Inserts or replaces by id, unless the stored copy is newer.
    /// Returns whether the entity was written.
    pub async fn upsert(&self, user_id: &str, entity: E) -> VaultResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load(user_id).await?;
        if let Some(existing) = map.get(entity.id())
            && existing.revision_date() > entity.revision_date()
        {
            debug!(
                "[STORE] Ignoring stale {} {} ({} < {})",
                E::KIND,
                entity.id(),
                entity.revision_date(),
                existing.revision_date()
            );
            return Ok(false);
        }
        map.insert(entity.id().to_string(), entity);
        self.store(user_id, &map).await?;
        Ok(true)
    }

    /// Applies `f` to every entity and persists the result in one write.
    /// Returns how many entities `f` reported as changed.
    pub async fn update_all<F>(&self, user_id: &str, mut f: F) -> VaultResult<usize>
    where
        F: FnMut(&mut E) -> bool + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load(user_id).await?;
        let mut changed = 0;
        for entity in map.values_mut() {
            if f(entity) {
                changed += 1;
            }
        }
        if changed > 0 {
            self.store(user_id, &map).await?;
        }
        Ok(changed)
    }

    /// Removes by id. Returns whether anything was removed.
    pub async fn delete(&self, user_id: &str, id: &str) -> VaultResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load(user_id).await?;
        if map.remove(id).is_none() {
            return Ok(false);
        }
        self.store(user_id, &map).await?;
        Ok(true)
    }

    /// Drops everything stored for `user_id`.
    pub async fn clear(&self, user_id: &str) -> VaultResult<()> {
        let _guard = self.write_lock.lock().await;
        self.storage.remove(&Self::key(user_id)).await?;
        Ok(())
    }
}
