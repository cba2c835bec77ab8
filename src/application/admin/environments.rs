use std::sync::Arc;

use thiserror::Error;

use crate::application::admin::{EnvironmentScope, require_non_empty};
use crate::application::repos::{
    ConfigsRepo, EnvironmentsRepo, EnvironmentsWriteRepo, FlagsRepo, ProjectsRepo, RepoError,
    UpdateEnvironmentParams,
};
use crate::cache::Invalidator;
use crate::domain::entities::EnvironmentRecord;

#[derive(Debug, Error)]
pub enum AdminEnvironmentError {
    #[error("environment not found")]
    NotFound,
    #[error("project not found")]
    ProjectNotFound,
    #[error("environment slug `{slug}` already exists in this project")]
    SlugExists { slug: String },
    #[error("environment still has {flags} flags and {configs} configs")]
    NotEmpty { flags: usize, configs: usize },
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for AdminEnvironmentError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::NotFound,
            other => Self::Repo(other),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateEnvironmentCommand {
    pub id: String,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<Option<String>>,
}

#[derive(Clone)]
pub struct AdminEnvironmentService {
    scope: EnvironmentScope,
    projects: Arc<dyn ProjectsRepo>,
    reader: Arc<dyn EnvironmentsRepo>,
    writer: Arc<dyn EnvironmentsWriteRepo>,
    flags: Arc<dyn FlagsRepo>,
    configs: Arc<dyn ConfigsRepo>,
}

impl AdminEnvironmentService {
    pub fn new(
        projects: Arc<dyn ProjectsRepo>,
        reader: Arc<dyn EnvironmentsRepo>,
        writer: Arc<dyn EnvironmentsWriteRepo>,
        flags: Arc<dyn FlagsRepo>,
        configs: Arc<dyn ConfigsRepo>,
        invalidator: Arc<dyn Invalidator>,
    ) -> Self {
        Self {
            scope: EnvironmentScope::new(projects.clone(), reader.clone(), invalidator),
            projects,
            reader,
            writer,
            flags,
            configs,
        }
    }

    /// Rename or re-slug an environment.
    ///
    /// A slug change moves the environment to a different cache key, so both
    /// the old and the new key are invalidated.
    pub async fn update_environment(
        &self,
        command: UpdateEnvironmentCommand,
    ) -> Result<EnvironmentRecord, AdminEnvironmentError> {
        let existing = self
            .reader
            .find_by_id(&command.id)
            .await?
            .ok_or(AdminEnvironmentError::NotFound)?;
        let project = self
            .projects
            .find_by_id(&existing.project_id)
            .await?
            .ok_or(AdminEnvironmentError::ProjectNotFound)?;

        let slug = match command.slug.as_deref() {
            Some(raw) => require_non_empty(raw)
                .ok_or(AdminEnvironmentError::ConstraintViolation("slug is required"))?,
            None => existing.slug.clone(),
        };

        let params = UpdateEnvironmentParams {
            id: existing.id.clone(),
            name: command
                .name
                .and_then(|name| require_non_empty(&name))
                .unwrap_or(existing.name),
            slug: slug.clone(),
            description: command.description.unwrap_or(existing.description),
        };

        let record = self
            .writer
            .update_environment(params)
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => AdminEnvironmentError::SlugExists { slug },
                other => AdminEnvironmentError::from(other),
            })?;

        self.scope
            .invalidate_slugs(&project.slug, &existing.slug)
            .await;
        if record.slug != existing.slug {
            self.scope.invalidate_slugs(&project.slug, &record.slug).await;
        }
        Ok(record)
    }

    /// Delete an environment that no longer owns any flag or config.
    pub async fn delete_environment(&self, id: &str) -> Result<(), AdminEnvironmentError> {
        let existing = self
            .reader
            .find_by_id(id)
            .await?
            .ok_or(AdminEnvironmentError::NotFound)?;
        let project = self
            .projects
            .find_by_id(&existing.project_id)
            .await?
            .ok_or(AdminEnvironmentError::ProjectNotFound)?;

        let (flags, configs) = tokio::try_join!(
            self.flags.list_for_environment(&existing.id),
            self.configs.list_for_environment(&existing.id),
        )?;
        if !flags.is_empty() || !configs.is_empty() {
            return Err(AdminEnvironmentError::NotEmpty {
                flags: flags.len(),
                configs: configs.len(),
            });
        }

        self.writer.delete_environment(&existing.id).await?;

        self.scope
            .invalidate_slugs(&project.slug, &existing.slug)
            .await;
        Ok(())
    }
}
