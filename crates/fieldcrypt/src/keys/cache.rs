//! [`SecretCache`]: bounded, TTL-expiring cache of key material.
//!
//! - Entries expire a fixed TTL after insertion; expiry is checked on read and by
//!   [`SecretCache::purge_expired`], which the host calls from a background timer.
//! - When full, the least recently used entry is evicted.
//! - Evicted key bytes are overwritten with zeros *before* the eviction listener
//!   runs and before the buffer is freed.
//! - [`SecretCache::get_or_try_insert_with`] runs at most one fetch per identifier
//!   at a time; concurrent callers for the same identifier wait for that fetch.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::debug;

use super::KeyMaterial;

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    /// The entry outlived the TTL.
    Expired,
    /// The cache was full and this was the least recently used entry.
    Size,
    /// A fresh value was inserted under the same identifier.
    Replaced,
    /// Removed on request.
    Explicit,
}

type EvictionListener = dyn Fn(&str, &[u8], RemovalCause) + Send + Sync;

struct Entry {
    key: KeyMaterial,
    inserted: Instant,
}

/// Shared cache of identifier -> key material.
pub struct SecretCache {
    entries: Mutex<LruCache<String, Entry>>,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<KeyMaterial>>>>,
    ttl: Duration,
    listener: Option<Arc<EvictionListener>>,
}

impl SecretCache {
    /// Create an empty cache holding at most `capacity` keys for `ttl` each.
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
            ttl,
            listener: None,
        }
    }

    /// Register a callback invoked for every eviction, after the bytes were zeroed.
    pub fn with_eviction_listener(
        mut self,
        listener: impl Fn(&str, &[u8], RemovalCause) + Send + Sync + 'static,
    ) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the live entry for `identifier`, evicting it if it has expired.
    pub fn get(&self, identifier: &str) -> Option<KeyMaterial> {
        let expired = {
            let mut entries = self.entries.lock();
            match entries.peek(identifier) {
                None => return None,
                Some(entry) if entry.inserted.elapsed() < self.ttl => {
                    return entries.get(identifier).map(|e| e.key.clone());
                }
                Some(_) => entries.pop(identifier),
            }
        };
        if let Some(entry) = expired {
            self.evict(identifier, entry, RemovalCause::Expired);
        }
        None
    }

    /// Return the cached key or fetch, cache and return it.
    ///
    /// Only one `fetch` per identifier runs at a time. Failed fetches are not cached.
    pub fn get_or_try_insert_with<E>(
        &self,
        identifier: &str,
        fetch: impl FnOnce() -> Result<KeyMaterial, E>,
    ) -> Result<KeyMaterial, E> {
        if let Some(key) = self.get(identifier) {
            return Ok(key);
        }

        let cell = {
            let mut in_flight = self.in_flight.lock();
            // Re-check under the in-flight lock: a fetch may have completed since.
            if let Some(key) = self.get(identifier) {
                return Ok(key);
            }
            in_flight.entry(identifier.to_owned()).or_default().clone()
        };

        let mut fetched = false;
        let result = cell
            .get_or_try_init(|| {
                fetched = true;
                fetch()
            })
            .map(KeyMaterial::clone);

        if fetched {
            if let Ok(key) = &result {
                self.insert(identifier, key.clone());
            }
            let mut in_flight = self.in_flight.lock();
            if in_flight
                .get(identifier)
                .is_some_and(|current| Arc::ptr_eq(current, &cell))
            {
                in_flight.remove(identifier);
            }
        }
        result
    }

    /// Insert or replace the entry for `identifier`.
    pub fn insert(&self, identifier: &str, key: KeyMaterial) {
        let displaced = self.entries.lock().push(
            identifier.to_owned(),
            Entry {
                key,
                inserted: Instant::now(),
            },
        );
        if let Some((old_id, old)) = displaced {
            let cause = if old_id == identifier {
                RemovalCause::Replaced
            } else {
                RemovalCause::Size
            };
            self.evict(&old_id, old, cause);
        }
    }

    /// Remove the entry for `identifier`, if any.
    pub fn invalidate(&self, identifier: &str) {
        let removed = self.entries.lock().pop(identifier);
        if let Some(entry) = removed {
            self.evict(identifier, entry, RemovalCause::Explicit);
        }
    }

    /// Evict every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let expired: Vec<(String, Entry)> = {
            let mut entries = self.entries.lock();
            let stale: Vec<String> = entries
                .iter()
                .filter(|(_, e)| e.inserted.elapsed() >= self.ttl)
                .map(|(id, _)| id.clone())
                .collect();
            stale
                .into_iter()
                .filter_map(|id| entries.pop(&id).map(|e| (id, e)))
                .collect()
        };
        let count = expired.len();
        for (id, entry) in expired {
            self.evict(&id, entry, RemovalCause::Expired);
        }
        count
    }

    fn evict(&self, identifier: &str, mut entry: Entry, cause: RemovalCause) {
        entry.key.wipe();
        debug!(identifier = %identifier, cause = ?cause, "evicted key from cache");
        if let Some(listener) = &self.listener {
            listener(identifier, entry.key.as_bytes(), cause);
        }
    }
}

impl std::fmt::Debug for SecretCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCache")
            .field("len", &self.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
