//! Cache configuration.
//!
//! Controls the snapshot cache backend, entry TTL and the client caching
//! directives.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_TTL_SECONDS: u64 = 60;
const DEFAULT_MAX_AGE_SECONDS: u64 = 5;
const DEFAULT_STALE_WHILE_REVALIDATE_SECONDS: u64 = 60;
const DEFAULT_MEMORY_CAPACITY: usize = 1024;

/// Where snapshot cache entries live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    /// Per-process LRU with expiry.
    Memory,
    /// `public_cache` table shared by every instance on the same database.
    Postgres,
}

/// Cache settings as seen by the read path and the stores.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Lifetime of a cache entry when nothing invalidates it first.
    pub ttl_seconds: u64,
    /// `max-age` sent to clients.
    pub max_age_seconds: u64,
    /// `stale-while-revalidate` sent to clients.
    pub stale_while_revalidate_seconds: u64,
    /// Maximum snapshots held by the memory backend.
    pub memory_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            max_age_seconds: DEFAULT_MAX_AGE_SECONDS,
            stale_while_revalidate_seconds: DEFAULT_STALE_WHILE_REVALIDATE_SECONDS,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            backend: settings.backend,
            ttl_seconds: settings.ttl.as_secs(),
            max_age_seconds: settings.max_age_seconds,
            stale_while_revalidate_seconds: settings.stale_while_revalidate_seconds,
            memory_capacity: settings.memory_capacity.get(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// Value of the `Cache-Control` header on public snapshot responses.
    pub fn cache_control(&self) -> String {
        format!(
            "public, max-age={}, stale-while-revalidate={}",
            self.max_age_seconds, self.stale_while_revalidate_seconds
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.backend, CacheBackend::Memory);
        assert_eq!(config.ttl_seconds, 60);
        assert_eq!(config.max_age_seconds, 5);
        assert_eq!(config.stale_while_revalidate_seconds, 60);
        assert_eq!(config.memory_capacity, 1024);
    }

    #[test]
    fn cache_control_renders_directives() {
        let config = CacheConfig::default();
        assert_eq!(
            config.cache_control(),
            "public, max-age=5, stale-while-revalidate=60"
        );
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            memory_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.memory_capacity_non_zero().get(), 1);
    }
}
