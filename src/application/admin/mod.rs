//! Application services for the administrative write path.
//!
//! Every mutation commits to the record store first and only then asks the
//! injected [`Invalidator`] to drop the affected environment's snapshot.

pub mod configs;
pub mod environments;
pub mod flags;

pub use configs::AdminConfigService;
pub use environments::AdminEnvironmentService;
pub use flags::AdminFlagService;

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::application::repos::{EnvironmentsRepo, ProjectsRepo, RepoError};
use crate::cache::Invalidator;
use crate::domain::entities::{EnvironmentRecord, ProjectRecord};

/// Failure to resolve the project/environment pair a write targets.
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("project not found")]
    ProjectNotFound,
    #[error("environment not found or owned by another project")]
    EnvironmentMismatch,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Project/environment resolution and invalidation shared by the flag and
/// config services.
#[derive(Clone)]
pub(crate) struct EnvironmentScope {
    projects: Arc<dyn ProjectsRepo>,
    environments: Arc<dyn EnvironmentsRepo>,
    invalidator: Arc<dyn Invalidator>,
}

impl EnvironmentScope {
    pub(crate) fn new(
        projects: Arc<dyn ProjectsRepo>,
        environments: Arc<dyn EnvironmentsRepo>,
        invalidator: Arc<dyn Invalidator>,
    ) -> Self {
        Self {
            projects,
            environments,
            invalidator,
        }
    }

    /// Load both records and check that the environment belongs to the project.
    pub(crate) async fn resolve(
        &self,
        project_id: &str,
        environment_id: &str,
    ) -> Result<(ProjectRecord, EnvironmentRecord), ScopeError> {
        let (project, environment) = tokio::try_join!(
            self.projects.find_by_id(project_id),
            self.environments.find_by_id(environment_id),
        )?;

        let project = project.ok_or(ScopeError::ProjectNotFound)?;
        match environment {
            Some(environment) if environment.project_id == project.id => {
                Ok((project, environment))
            }
            _ => Err(ScopeError::EnvironmentMismatch),
        }
    }

    /// Invalidate after a committed write, given only the row's ids.
    ///
    /// The write already succeeded, so lookup failures are logged and the TTL
    /// is left to expire the entry.
    pub(crate) async fn invalidate(&self, project_id: &str, environment_id: &str) {
        match self.resolve(project_id, environment_id).await {
            Ok((project, environment)) => {
                self.invalidator
                    .invalidate(&project.slug, &environment.slug)
                    .await;
            }
            Err(err) => {
                warn!(
                    project_id,
                    environment_id,
                    error = %err,
                    "could not resolve slugs for cache invalidation"
                );
            }
        }
    }

    pub(crate) async fn invalidate_slugs(&self, project_slug: &str, environment_slug: &str) {
        self.invalidator
            .invalidate(project_slug, environment_slug)
            .await;
    }
}

/// Record id of the form `<prefix>_<uuid>`.
pub(crate) fn generate_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

pub(crate) fn require_non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
