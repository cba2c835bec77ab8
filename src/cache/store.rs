//! Snapshot cache storage.
//!
//! The read path treats every [`CacheError`] as a miss and the write path
//! only logs it; entries that survive a lost delete still expire at TTL.

use std::sync::{RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use thiserror::Error;
use tracing::warn;

use super::config::CacheConfig;
use super::keys::SnapshotKey;

const SOURCE: &str = "cache::store";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Key to serialized-snapshot store with expiry.
#[async_trait]
pub trait FreshnessCache: Send + Sync {
    /// Returns `None` when the key was never written, was deleted, or expired.
    async fn get(&self, key: &SnapshotKey) -> Result<Option<String>, CacheError>;

    async fn put(&self, key: &SnapshotKey, body: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &SnapshotKey) -> Result<(), CacheError>;
}

struct MemoryEntry {
    body: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process LRU backend. Entries past their expiry are dropped on read.
pub struct MemoryCache {
    entries: RwLock<LruCache<SnapshotKey, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.memory_capacity_non_zero())),
        }
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.lock("len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(
        &self,
        op: &'static str,
    ) -> RwLockWriteGuard<'_, LruCache<SnapshotKey, MemoryEntry>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!(
                op,
                target_module = SOURCE,
                lock_kind = "rwlock.write",
                result = "poisoned_recovered",
                "Recovered from poisoned cache lock"
            );
            poisoned.into_inner()
        })
    }
}

#[async_trait]
impl FreshnessCache for MemoryCache {
    async fn get(&self, key: &SnapshotKey) -> Result<Option<String>, CacheError> {
        let mut entries = self.lock("get");
        let now = Instant::now();
        let cached = entries
            .get(key)
            .map(|entry| entry.is_live(now).then(|| entry.body.clone()));
        match cached {
            Some(Some(body)) => Ok(Some(body)),
            Some(None) => {
                entries.pop(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &SnapshotKey, body: &str, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::Backend(format!("ttl of {ttl:?} overflows the clock")))?;
        let entry = MemoryEntry {
            body: body.to_string(),
            expires_at,
        };
        self.lock("put").put(key.clone(), entry);
        Ok(())
    }

    async fn delete(&self, key: &SnapshotKey) -> Result<(), CacheError> {
        self.lock("delete").pop(key);
        Ok(())
    }
}
