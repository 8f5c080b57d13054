//! Keyed cache stores with per-entry TTL.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::Instant;

use courtside_core::time::deadline_after;

use crate::error::CacheError;

/// A shared cache that owns expiry and eviction.
///
/// Implementations synchronise internally; callers never lock.
#[async_trait]
pub trait CacheStore<V>: Send + Sync {
    /// Store `value` under `key`, replacing any previous entry.
    async fn set(&self, key: &str, value: V, ttl: Duration) -> Result<(), CacheError>;

    /// Fetch a live entry. Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<V>, CacheError>;

    /// Drop `key`. Returns whether a live entry was removed.
    async fn remove(&self, key: &str) -> Result<bool, CacheError>;
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// In-process LRU cache with per-entry expiry.
pub struct MemoryCache<V> {
    entries: Mutex<LruCache<String, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> MemoryCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Entries currently held, expired ones included until next touched.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl<V> CacheStore<V> for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn set(&self, key: &str, value: V, ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry {
            value,
            expires_at: deadline_after(ttl),
        };
        self.entries.lock().await.put(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        let mut entries = self.entries.lock().await;
        let live = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            _ => None,
        };
        if live.is_none() {
            entries.pop(key);
        }
        drop(entries);

        match live {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        Ok(live)
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let removed = self.entries.lock().await.pop(key);
        Ok(removed.is_some_and(|entry| entry.expires_at > Instant::now()))
    }
}
