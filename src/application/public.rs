//! Read path for public snapshots: cache lookup, conditional check,
//! record-store fallback and background repopulation.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::application::repos::{EnvironmentsRepo, ProjectsRepo, RepoError};
use crate::application::snapshot::{SnapshotBuilder, SnapshotError};
use crate::cache::{CacheConfig, ETag, FreshnessCache, SnapshotKey, derive_key};

const METRIC_PUBLIC_CACHE_HIT_TOTAL: &str = "figflag_public_cache_hit_total";
const METRIC_PUBLIC_CACHE_MISS_TOTAL: &str = "figflag_public_cache_miss_total";
const METRIC_PUBLIC_NOT_MODIFIED_TOTAL: &str = "figflag_public_not_modified_total";

#[derive(Debug, Error)]
pub enum PublicSnapshotError {
    #[error("project not found")]
    ProjectNotFound,
    #[error("environment not found")]
    EnvironmentNotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<SnapshotError> for PublicSnapshotError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::EnvironmentNotFound { .. } => Self::EnvironmentNotFound,
            SnapshotError::Repo(err) => Self::Repo(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Cache,
    Store,
}

impl SnapshotSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Store => "store",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicSnapshotOutcome {
    /// Serialized snapshot plus the validator computed over exactly these bytes.
    Body {
        body: String,
        etag: ETag,
        source: SnapshotSource,
    },
    /// The client's `If-None-Match` already names the current snapshot.
    NotModified { etag: ETag, source: SnapshotSource },
}

impl PublicSnapshotOutcome {
    pub fn etag(&self) -> &ETag {
        match self {
            Self::Body { etag, .. } | Self::NotModified { etag, .. } => etag,
        }
    }

    pub fn source(&self) -> SnapshotSource {
        match self {
            Self::Body { source, .. } | Self::NotModified { source, .. } => *source,
        }
    }

    /// Cache decision label used in logs: `hit`, `miss` or `not_modified`.
    pub fn cache_outcome(&self) -> &'static str {
        match self {
            Self::NotModified { .. } => "not_modified",
            Self::Body {
                source: SnapshotSource::Cache,
                ..
            } => "hit",
            Self::Body {
                source: SnapshotSource::Store,
                ..
            } => "miss",
        }
    }
}

pub struct PublicSnapshotService {
    projects: Arc<dyn ProjectsRepo>,
    environments: Arc<dyn EnvironmentsRepo>,
    builder: SnapshotBuilder,
    cache: Arc<dyn FreshnessCache>,
    config: CacheConfig,
}

impl PublicSnapshotService {
    pub fn new(
        projects: Arc<dyn ProjectsRepo>,
        environments: Arc<dyn EnvironmentsRepo>,
        builder: SnapshotBuilder,
        cache: Arc<dyn FreshnessCache>,
        config: CacheConfig,
    ) -> Self {
        Self {
            projects,
            environments,
            builder,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Serve the snapshot for `project_slug/environment_slug`.
    ///
    /// Cache failures degrade to a miss. Record-store failures are returned.
    #[instrument(skip(self, if_none_match), fields(project = %project_slug, environment = %environment_slug))]
    pub async fn resolve(
        &self,
        project_slug: &str,
        environment_slug: &str,
        if_none_match: Option<&str>,
    ) -> Result<PublicSnapshotOutcome, PublicSnapshotError> {
        let key = derive_key(project_slug, environment_slug);

        if let Some(body) = self.lookup(&key).await {
            counter!(METRIC_PUBLIC_CACHE_HIT_TOTAL).increment(1);
            debug!(cache_key = %key, outcome = "hit", "serving cached snapshot");
            return Ok(conditional(body, SnapshotSource::Cache, if_none_match));
        }

        counter!(METRIC_PUBLIC_CACHE_MISS_TOTAL).increment(1);
        debug!(cache_key = %key, outcome = "miss", "building snapshot from record store");

        let project = self
            .projects
            .find_by_slug(project_slug)
            .await?
            .ok_or(PublicSnapshotError::ProjectNotFound)?;
        let environment = self
            .environments
            .find_by_slug(&project.id, environment_slug)
            .await?
            .ok_or(PublicSnapshotError::EnvironmentNotFound)?;

        let snapshot = self.builder.build(&project, &environment).await?;
        let body = serde_json::to_string(&snapshot)?;

        self.populate(key, body.clone());

        Ok(conditional(body, SnapshotSource::Store, if_none_match))
    }

    async fn lookup(&self, key: &SnapshotKey) -> Option<String> {
        match self.cache.get(key).await {
            Ok(body) => body.filter(|body| !body.is_empty()),
            Err(err) => {
                counter!(crate::cache::METRIC_CACHE_ERROR_TOTAL, "op" => "get").increment(1);
                warn!(
                    cache_key = %key,
                    outcome = "error",
                    error = %err,
                    "cache read failed; falling back to record store"
                );
                None
            }
        }
    }

    /// Write the fresh body back without holding up the response.
    fn populate(&self, key: SnapshotKey, body: String) {
        let cache = Arc::clone(&self.cache);
        let ttl = self.config.ttl();
        tokio::spawn(async move {
            if let Err(err) = cache.put(&key, &body, ttl).await {
                counter!(crate::cache::METRIC_CACHE_ERROR_TOTAL, "op" => "put").increment(1);
                warn!(
                    cache_key = %key,
                    outcome = "error",
                    error = %err,
                    "cache write failed; snapshot served uncached"
                );
            }
        });
    }
}

fn conditional(
    body: String,
    source: SnapshotSource,
    if_none_match: Option<&str>,
) -> PublicSnapshotOutcome {
    let etag = ETag::compute(body.as_bytes());
    if etag.matches_if_none_match(if_none_match) {
        counter!(METRIC_PUBLIC_NOT_MODIFIED_TOTAL).increment(1);
        PublicSnapshotOutcome::NotModified { etag, source }
    } else {
        PublicSnapshotOutcome::Body { body, etag, source }
    }
}
