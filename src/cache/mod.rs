//! Figflag Cache System
//!
//! Keeps a time-bounded copy of each environment's public snapshot so the
//! read path can skip the record store:
//!
//! - **Keys**: `public:<project>:<environment>` with both slugs sanitized
//! - **Store**: [`FreshnessCache`] backends with per-entry TTL
//! - **Validators**: content-derived [`ETag`]s recomputed from the served bytes
//! - **Invalidation**: [`Invalidator`] deletes an environment's entry after a write
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! backend = "memory"
//! ttl_seconds = 60
//! max_age_seconds = 5
//! stale_while_revalidate_seconds = 60
//! ```

mod config;
mod etag;
mod invalidator;
mod keys;
mod store;

pub use config::{CacheBackend, CacheConfig};
pub use etag::ETag;
pub use invalidator::{CacheInvalidator, Invalidator};
pub use keys::{SnapshotKey, derive_key, sanitize_component};
pub use store::{CacheError, FreshnessCache, MemoryCache};

pub(crate) const METRIC_CACHE_ERROR_TOTAL: &str = "figflag_cache_error_total";
pub(crate) const METRIC_CACHE_INVALIDATE_TOTAL: &str = "figflag_cache_invalidate_total";
