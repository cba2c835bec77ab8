//! `FreshnessCache` over the `public_cache` table, shared by every instance
//! that points at the same database.

use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{CacheError, FreshnessCache, SnapshotKey};

use super::PostgresRepositories;

fn cache_error(err: sqlx::Error) -> CacheError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            CacheError::Unavailable(err.to_string())
        }
        other => CacheError::Backend(other.to_string()),
    }
}

#[async_trait]
impl FreshnessCache for PostgresRepositories {
    async fn get(&self, key: &SnapshotKey) -> Result<Option<String>, CacheError> {
        sqlx::query_scalar::<_, String>(
            "SELECT body FROM public_cache WHERE key = $1 AND expires_at > now()",
        )
        .bind(key.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(cache_error)
    }

    async fn put(&self, key: &SnapshotKey, body: &str, ttl: Duration) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT INTO public_cache (key, body, expires_at)
            VALUES ($1, $2, now() + make_interval(secs => $3))
            ON CONFLICT (key) DO UPDATE
            SET body = EXCLUDED.body, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key.as_str())
        .bind(body)
        .bind(ttl.as_secs_f64())
        .execute(self.pool())
        .await
        .map(|_| ())
        .map_err(cache_error)
    }

    async fn delete(&self, key: &SnapshotKey) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM public_cache WHERE key = $1")
            .bind(key.as_str())
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(cache_error)
    }
}
