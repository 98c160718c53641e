//! Short-lived sorted result sets for repeated autofill lookups.
//!
//! Each key (usually a page URL) holds the sorted matches, a rotating
//! "last used" cursor and a TTL task. The TTL restarts on `add_ciphers`,
//! `get_last_used` and `get_next`; on expiry the whole entry is dropped.

use crate::lock::LockListener;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyward_model::CipherView;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Items that remember when they were last launched.
pub trait LaunchTracked {
    fn last_launched(&self) -> Option<DateTime<Utc>>;
}

impl LaunchTracked for CipherView {
    fn last_launched(&self) -> Option<DateTime<Utc>> {
        self.last_launched
    }
}

struct Entry<T> {
    items: Vec<T>,
    /// `None` until the first cursor access.
    last_used_index: Option<usize>,
    generation: u64,
    timer: JoinHandle<()>,
}

impl<T> Entry<T> {
    fn cursor_or_first(&self) -> usize {
        self.last_used_index.unwrap_or(0)
    }

    fn advance(&mut self) -> usize {
        let next = match self.last_used_index {
            Some(i) => (i + 1) % self.items.len(),
            None => 0,
        };
        self.last_used_index = Some(next);
        next
    }
}

impl<T> Drop for Entry<T> {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

struct Entries<T> {
    map: HashMap<String, Entry<T>>,
    next_generation: u64,
}

/// Process-wide TTL cache of sorted autofill candidates.
pub struct SortedResultCache<T> {
    entries: Arc<Mutex<Entries<T>>>,
    ttl: Duration,
}

impl<T> SortedResultCache<T>
where
    T: LaunchTracked + Clone + Send + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Entries {
                map: HashMap::new(),
                next_generation: 0,
            })),
            ttl,
        }
    }

    pub async fn is_cached(&self, key: &str) -> bool {
        self.entries.lock().await.map.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stable-sorts `items` with `compare`, replaces whatever `key` held and
    /// starts a fresh TTL.
    pub async fn add_ciphers<F>(&self, key: &str, mut items: Vec<T>, compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        items.sort_by(compare);
        let count = items.len();
        let mut entries = self.entries.lock().await;
        let generation = Self::bump(&mut entries);
        let timer = self.schedule_expiry(key.to_string(), generation);
        // Replacing drops the previous entry, which aborts its timer.
        entries.map.insert(
            key.to_string(),
            Entry {
                items,
                last_used_index: None,
                generation,
                timer,
            },
        );
        debug!("[CACHE] Cached {} results for {}", count, key);
    }

    /// Item at the cursor, pinning an unset cursor to the first item.
    pub async fn get_last_used(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock().await;
        self.refresh(&mut entries, key);
        let entry = entries.map.get_mut(key)?;
        if entry.items.is_empty() {
            return None;
        }
        let index = entry.cursor_or_first();
        entry.last_used_index = Some(index);
        entry.items.get(index).cloned()
    }

    /// Most recently launched item among those with a launch time. Leaves
    /// both the cursor and the TTL untouched.
    pub async fn get_last_launched(&self, key: &str) -> Option<T> {
        let entries = self.entries.lock().await;
        let entry = entries.map.get(key)?;
        entry
            .items
            .iter()
            .filter_map(|item| item.last_launched().map(|at| (at, item)))
            // Earliest of equal maxima wins.
            .fold(None::<(DateTime<Utc>, &T)>, |best, (at, item)| match best {
                Some((best_at, _)) if best_at >= at => best,
                _ => Some((at, item)),
            })
            .map(|(_, item)| item.clone())
    }

    /// Advances the cursor cyclically and returns the item under it.
    pub async fn get_next(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock().await;
        self.refresh(&mut entries, key);
        let entry = entries.map.get_mut(key)?;
        if entry.items.is_empty() {
            return None;
        }
        let index = entry.advance();
        entry.items.get(index).cloned()
    }

    /// Advances the cursor without reading.
    pub async fn update_last_used_index(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.map.get_mut(key)
            && !entry.items.is_empty()
        {
            entry.advance();
        }
    }

    /// Drops every entry and cancels every pending TTL task.
    /// Drops the result set under `key`, if any.
    pub async fn remove(&self, key: &str) -> bool {
        self.entries.lock().await.map.remove(key).is_some()
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        let evicted = entries.map.len();
        entries.map.clear();
        if evicted > 0 {
            debug!("[CACHE] Cleared {} cached result sets", evicted);
        }
    }

    fn bump(entries: &mut Entries<T>) -> u64 {
        entries.next_generation += 1;
        entries.next_generation
    }

    /// Restarts the TTL of `key`, if present.
    fn refresh(&self, entries: &mut Entries<T>, key: &str) {
        if !entries.map.contains_key(key) {
            return;
        }
        let generation = Self::bump(entries);
        let timer = self.schedule_expiry(key.to_string(), generation);
        if let Some(entry) = entries.map.get_mut(key) {
            entry.timer.abort();
            entry.timer = timer;
            entry.generation = generation;
        }
    }

    fn schedule_expiry(&self, key: String, generation: u64) -> JoinHandle<()> {
        let entries: Weak<Mutex<Entries<T>>> = Arc::downgrade(&self.entries);
        let deadline = tokio::time::Instant::now() + self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(entries) = entries.upgrade() else {
                return;
            };
            let mut entries = entries.lock().await;
            // A refreshed or replaced entry carries a newer generation.
            if entries
                .map
                .get(&key)
                .is_some_and(|entry| entry.generation == generation)
            {
                entries.map.remove(&key);
                debug!("[CACHE] Expired results for {}", key);
            }
        })
    }
}

#[async_trait]
impl<T> LockListener for SortedResultCache<T>
where
    T: LaunchTracked + Clone + Send + Sync + 'static,
{
    async fn on_lock(&self) {
        self.clear().await;
    }
}
