use std::sync::Arc;

use thiserror::Error;

use crate::application::admin::{EnvironmentScope, ScopeError, generate_id, require_non_empty};
use crate::application::repos::{
    CreateFlagParams, EnvironmentsRepo, FlagsRepo, FlagsWriteRepo, ProjectsRepo, RepoError,
    UpdateFlagParams,
};
use crate::cache::Invalidator;
use crate::domain::entities::FlagRecord;

#[derive(Debug, Error)]
pub enum AdminFlagError {
    #[error("flag not found")]
    NotFound,
    #[error("project not found")]
    ProjectNotFound,
    #[error("environment does not belong to the project")]
    EnvironmentMismatch,
    #[error("flag key `{key}` already exists in this environment")]
    KeyExists { key: String },
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for AdminFlagError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::NotFound,
            other => Self::Repo(other),
        }
    }
}

impl From<ScopeError> for AdminFlagError {
    fn from(err: ScopeError) -> Self {
        match err {
            ScopeError::ProjectNotFound => Self::ProjectNotFound,
            ScopeError::EnvironmentMismatch => Self::EnvironmentMismatch,
            ScopeError::Repo(repo) => Self::Repo(repo),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateFlagCommand {
    pub project_id: String,
    pub environment_id: String,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub default_value: Option<String>,
}

/// Partial update; `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateFlagCommand {
    pub id: String,
    pub key: Option<String>,
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub enabled: Option<bool>,
    pub default_value: Option<Option<String>>,
}

#[derive(Clone)]
pub struct AdminFlagService {
    scope: EnvironmentScope,
    reader: Arc<dyn FlagsRepo>,
    writer: Arc<dyn FlagsWriteRepo>,
}

impl AdminFlagService {
    pub fn new(
        projects: Arc<dyn ProjectsRepo>,
        environments: Arc<dyn EnvironmentsRepo>,
        reader: Arc<dyn FlagsRepo>,
        writer: Arc<dyn FlagsWriteRepo>,
        invalidator: Arc<dyn Invalidator>,
    ) -> Self {
        Self {
            scope: EnvironmentScope::new(projects, environments, invalidator),
            reader,
            writer,
        }
    }

    pub async fn create_flag(
        &self,
        command: CreateFlagCommand,
    ) -> Result<FlagRecord, AdminFlagError> {
        let key = require_non_empty(&command.key)
            .ok_or(AdminFlagError::ConstraintViolation("key is required"))?;
        let name = require_non_empty(&command.name).unwrap_or_else(|| key.clone());

        let (project, environment) = self
            .scope
            .resolve(&command.project_id, &command.environment_id)
            .await?;

        let params = CreateFlagParams {
            id: generate_id("flag"),
            project_id: project.id,
            environment_id: environment.id,
            key: key.clone(),
            name,
            description: command.description,
            enabled: command.enabled,
            default_value: command.default_value,
        };

        let record = self
            .writer
            .create_flag(params)
            .await
            .map_err(|err| key_conflict(err, &key))?;

        self.scope
            .invalidate_slugs(&project.slug, &environment.slug)
            .await;
        Ok(record)
    }

    pub async fn update_flag(
        &self,
        command: UpdateFlagCommand,
    ) -> Result<FlagRecord, AdminFlagError> {
        let existing = self
            .reader
            .find_by_id(&command.id)
            .await?
            .ok_or(AdminFlagError::NotFound)?;

        let key = match command.key.as_deref() {
            Some(raw) => require_non_empty(raw)
                .ok_or(AdminFlagError::ConstraintViolation("key is required"))?,
            None => existing.key.clone(),
        };

        let params = UpdateFlagParams {
            id: existing.id.clone(),
            key: key.clone(),
            name: command
                .name
                .and_then(|name| require_non_empty(&name))
                .unwrap_or(existing.name),
            description: command.description.unwrap_or(existing.description),
            enabled: command.enabled.unwrap_or(existing.enabled),
            default_value: command.default_value.unwrap_or(existing.default_value),
        };

        let record = self
            .writer
            .update_flag(params)
            .await
            .map_err(|err| key_conflict(err, &key))?;

        self.scope
            .invalidate(&record.project_id, &record.environment_id)
            .await;
        Ok(record)
    }

    pub async fn delete_flag(&self, id: &str) -> Result<(), AdminFlagError> {
        let existing = self
            .reader
            .find_by_id(id)
            .await?
            .ok_or(AdminFlagError::NotFound)?;

        self.writer.delete_flag(&existing.id).await?;

        self.scope
            .invalidate(&existing.project_id, &existing.environment_id)
            .await;
        Ok(())
    }
}

fn key_conflict(err: RepoError, key: &str) -> AdminFlagError {
    match err {
        RepoError::Duplicate { .. } => AdminFlagError::KeyExists {
            key: key.to_string(),
        },
        other => AdminFlagError::from(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{InMemoryStore, RecordingInvalidator};

    fn service(store: &Arc<InMemoryStore>) -> (AdminFlagService, Arc<RecordingInvalidator>) {
        let invalidator = Arc::new(RecordingInvalidator::new(store.clone()));
        let service = AdminFlagService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            invalidator.clone(),
        );
        (service, invalidator)
    }

    fn create(key: &str, environment_id: &str) -> CreateFlagCommand {
        CreateFlagCommand {
            project_id: "proj_acme".into(),
            environment_id: environment_id.into(),
            key: key.into(),
            name: String::new(),
            description: None,
            enabled: true,
            default_value: None,
        }
    }

    #[tokio::test]
    async fn create_invalidates_after_commit() {
        let store = InMemoryStore::seeded();
        let (service, invalidator) = service(&store);

        let record = service
            .create_flag(create("beta", "env_prod"))
            .await
            .expect("flag should be created");

        assert!(record.id.starts_with("flag_"));
        assert_eq!(record.name, "beta");
        assert_eq!(
            invalidator.calls(),
            vec![("acme".to_string(), "prod".to_string(), store.version())]
        );
        assert_eq!(store.version(), 1);
    }

    #[tokio::test]
    async fn create_rejects_environment_of_another_project() {
        let store = InMemoryStore::seeded();
        let (service, invalidator) = service(&store);

        let err = service
            .create_flag(create("beta", "env_other_staging"))
            .await
            .expect_err("environment belongs to another project");

        assert!(matches!(err, AdminFlagError::EnvironmentMismatch));
        assert!(invalidator.calls().is_empty());
        assert_eq!(store.version(), 0);
    }

    #[tokio::test]
    async fn create_rejects_unknown_project() {
        let store = InMemoryStore::seeded();
        let (service, _) = service(&store);

        let mut command = create("beta", "env_prod");
        command.project_id = "proj_missing".into();
        let err = service.create_flag(command).await.expect_err("no project");

        assert!(matches!(err, AdminFlagError::ProjectNotFound));
    }

    #[tokio::test]
    async fn duplicate_key_maps_to_key_exists_without_invalidation() {
        let store = InMemoryStore::seeded();
        let (service, invalidator) = service(&store);

        let err = service
            .create_flag(create("new_ui", "env_prod"))
            .await
            .expect_err("key already used");

        match err {
            AdminFlagError::KeyExists { key } => assert_eq!(key, "new_ui"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(invalidator.calls().is_empty());
    }

    #[tokio::test]
    async fn blank_key_is_rejected() {
        let store = InMemoryStore::seeded();
        let (service, _) = service(&store);

        let err = service
            .create_flag(create("   ", "env_prod"))
            .await
            .expect_err("blank key");

        assert!(matches!(err, AdminFlagError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn update_patches_only_given_fields() {
        let store = InMemoryStore::seeded();
        let (service, invalidator) = service(&store);

        let record = service
            .update_flag(UpdateFlagCommand {
                id: "flag_new_ui".into(),
                enabled: Some(false),
                ..UpdateFlagCommand::default()
            })
            .await
            .expect("flag should update");

        assert!(!record.enabled);
        assert_eq!(record.key, "new_ui");
        assert_eq!(record.name, "new_ui");
        assert_eq!(
            invalidator.calls(),
            vec![("acme".to_string(), "prod".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn update_unknown_flag_is_not_found() {
        let store = InMemoryStore::seeded();
        let (service, invalidator) = service(&store);

        let err = service
            .update_flag(UpdateFlagCommand {
                id: "flag_missing".into(),
                ..UpdateFlagCommand::default()
            })
            .await
            .expect_err("missing flag");

        assert!(matches!(err, AdminFlagError::NotFound));
        assert!(invalidator.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_invalidates_owning_environment() {
        let store = InMemoryStore::seeded();
        let (service, invalidator) = service(&store);

        service
            .delete_flag("flag_new_ui")
            .await
            .expect("flag should be deleted");

        assert!(
            FlagsRepo::find_by_id(store.as_ref(), "flag_new_ui")
                .await
                .expect("lookup")
                .is_none()
        );
        assert_eq!(
            invalidator.calls(),
            vec![("acme".to_string(), "prod".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn invalidation_lookup_failure_does_not_fail_the_write() {
        let store = InMemoryStore::seeded();
        let (service, invalidator) = service(&store);
        store.remove_environment("env_prod");

        service
            .delete_flag("flag_new_ui")
            .await
            .expect("write succeeds even when slugs cannot be resolved");

        assert!(invalidator.calls().is_empty());
    }
}
