//! Write-path cache invalidation.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tracing::{debug, warn};

use super::keys::derive_key;
use super::store::FreshnessCache;
use super::{METRIC_CACHE_ERROR_TOTAL, METRIC_CACHE_INVALIDATE_TOTAL};

/// Drops the cached public snapshot of one environment.
///
/// Callers invoke this only after their record-store write has committed.
/// Failures are absorbed; the entry TTL bounds how long a lost delete can
/// leave a stale snapshot visible.
#[async_trait]
pub trait Invalidator: Send + Sync {
    async fn invalidate(&self, project_slug: &str, environment_slug: &str);
}

pub struct CacheInvalidator {
    cache: Arc<dyn FreshnessCache>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<dyn FreshnessCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Invalidator for CacheInvalidator {
    async fn invalidate(&self, project_slug: &str, environment_slug: &str) {
        let key = derive_key(project_slug, environment_slug);
        match self.cache.delete(&key).await {
            Ok(()) => {
                counter!(METRIC_CACHE_INVALIDATE_TOTAL).increment(1);
                debug!(cache_key = %key, outcome = "invalidated", "cache entry invalidated");
            }
            Err(err) => {
                counter!(METRIC_CACHE_ERROR_TOTAL, "op" => "delete").increment(1);
                warn!(
                    cache_key = %key,
                    outcome = "error",
                    error = %err,
                    "cache invalidation failed; entry will expire at TTL"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::{CacheConfig, CacheError, MemoryCache, SnapshotKey};

    struct FailingCache;

    #[async_trait]
    impl FreshnessCache for FailingCache {
        async fn get(&self, _key: &SnapshotKey) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }

        async fn put(
            &self,
            _key: &SnapshotKey,
            _body: &str,
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }

        async fn delete(&self, _key: &SnapshotKey) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn invalidate_removes_the_environment_entry_only() {
        let cache = Arc::new(MemoryCache::new(&CacheConfig::default()));
        let prod = derive_key("acme", "prod");
        let staging = derive_key("acme", "staging");
        cache
            .put(&prod, "{}", Duration::from_secs(60))
            .await
            .expect("put prod");
        cache
            .put(&staging, "{}", Duration::from_secs(60))
            .await
            .expect("put staging");

        let invalidator = CacheInvalidator::new(cache.clone());
        invalidator.invalidate("acme", "prod").await;

        assert!(cache.get(&prod).await.expect("get").is_none());
        assert!(cache.get(&staging).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn invalidate_sanitizes_like_the_read_path() {
        let cache = Arc::new(MemoryCache::new(&CacheConfig::default()));
        let key = derive_key("acme co", "prod");
        cache
            .put(&key, "{}", Duration::from_secs(60))
            .await
            .expect("put");

        CacheInvalidator::new(cache.clone())
            .invalidate("acme co", "prod")
            .await;

        assert!(cache.get(&key).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn backend_failure_is_swallowed() {
        let invalidator = CacheInvalidator::new(Arc::new(FailingCache));
        invalidator.invalidate("acme", "prod").await;
    }
}
