use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::application::admin::{EnvironmentScope, ScopeError, generate_id, require_non_empty};
use crate::application::repos::{
    ConfigsRepo, ConfigsWriteRepo, CreateConfigParams, EnvironmentsRepo, ProjectsRepo, RepoError,
    UpdateConfigParams,
};
use crate::cache::Invalidator;
use crate::domain::entities::ConfigRecord;

#[derive(Debug, Error)]
pub enum AdminConfigError {
    #[error("config not found")]
    NotFound,
    #[error("project not found")]
    ProjectNotFound,
    #[error("environment does not belong to the project")]
    EnvironmentMismatch,
    #[error("config key `{key}` already exists in this environment")]
    KeyExists { key: String },
    #[error("value must be valid JSON: {reason}")]
    InvalidValue { reason: String },
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for AdminConfigError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::NotFound,
            other => Self::Repo(other),
        }
    }
}

impl From<ScopeError> for AdminConfigError {
    fn from(err: ScopeError) -> Self {
        match err {
            ScopeError::ProjectNotFound => Self::ProjectNotFound,
            ScopeError::EnvironmentMismatch => Self::EnvironmentMismatch,
            ScopeError::Repo(repo) => Self::Repo(repo),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateConfigCommand {
    pub project_id: String,
    pub environment_id: String,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    /// `None` and `Value::Null` both store no value.
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateConfigCommand {
    pub id: String,
    pub key: Option<String>,
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    /// `None` keeps the stored value, `Some(Value::Null)` clears it.
    pub value: Option<Value>,
}

#[derive(Clone)]
pub struct AdminConfigService {
    scope: EnvironmentScope,
    reader: Arc<dyn ConfigsRepo>,
    writer: Arc<dyn ConfigsWriteRepo>,
}

impl AdminConfigService {
    pub fn new(
        projects: Arc<dyn ProjectsRepo>,
        environments: Arc<dyn EnvironmentsRepo>,
        reader: Arc<dyn ConfigsRepo>,
        writer: Arc<dyn ConfigsWriteRepo>,
        invalidator: Arc<dyn Invalidator>,
    ) -> Self {
        Self {
            scope: EnvironmentScope::new(projects, environments, invalidator),
            reader,
            writer,
        }
    }

    /// Parse user-supplied JSON text into a value for a command.
    pub fn parse_value(raw: &str) -> Result<Value, AdminConfigError> {
        serde_json::from_str(raw).map_err(|err| AdminConfigError::InvalidValue {
            reason: err.to_string(),
        })
    }

    pub async fn create_config(
        &self,
        command: CreateConfigCommand,
    ) -> Result<ConfigRecord, AdminConfigError> {
        let key = require_non_empty(&command.key)
            .ok_or(AdminConfigError::ConstraintViolation("key is required"))?;
        let name = require_non_empty(&command.name).unwrap_or_else(|| key.clone());
        let value = match command.value {
            Some(value) => encode_value(value)?,
            None => None,
        };

        let (project, environment) = self
            .scope
            .resolve(&command.project_id, &command.environment_id)
            .await?;

        let params = CreateConfigParams {
            id: generate_id("cfg"),
            project_id: project.id,
            environment_id: environment.id,
            key: key.clone(),
            name,
            description: command.description,
            value,
        };

        let record = self
            .writer
            .create_config(params)
            .await
            .map_err(|err| key_conflict(err, &key))?;

        self.scope
            .invalidate_slugs(&project.slug, &environment.slug)
            .await;
        Ok(record)
    }

    pub async fn update_config(
        &self,
        command: UpdateConfigCommand,
    ) -> Result<ConfigRecord, AdminConfigError> {
        let value = match command.value {
            Some(value) => Some(encode_value(value)?),
            None => None,
        };

        let existing = self
            .reader
            .find_by_id(&command.id)
            .await?
            .ok_or(AdminConfigError::NotFound)?;

        let key = match command.key.as_deref() {
            Some(raw) => require_non_empty(raw)
                .ok_or(AdminConfigError::ConstraintViolation("key is required"))?,
            None => existing.key.clone(),
        };

        let params = UpdateConfigParams {
            id: existing.id.clone(),
            key: key.clone(),
            name: command
                .name
                .and_then(|name| require_non_empty(&name))
                .unwrap_or(existing.name),
            description: command.description.unwrap_or(existing.description),
            value: value.unwrap_or(existing.value),
        };

        let record = self
            .writer
            .update_config(params)
            .await
            .map_err(|err| key_conflict(err, &key))?;

        self.scope
            .invalidate(&record.project_id, &record.environment_id)
            .await;
        Ok(record)
    }

    pub async fn delete_config(&self, id: &str) -> Result<(), AdminConfigError> {
        let existing = self
            .reader
            .find_by_id(id)
            .await?
            .ok_or(AdminConfigError::NotFound)?;

        self.writer.delete_config(&existing.id).await?;

        self.scope
            .invalidate(&existing.project_id, &existing.environment_id)
            .await;
        Ok(())
    }
}

/// Strings are stored verbatim, any other value as its JSON text, null as absent.
fn encode_value(value: Value) -> Result<Option<String>, AdminConfigError> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text)),
        other => serde_json::to_string(&other)
            .map(Some)
            .map_err(|err| AdminConfigError::InvalidValue {
                reason: err.to_string(),
            }),
    }
}

fn key_conflict(err: RepoError, key: &str) -> AdminConfigError {
    match err {
        RepoError::Duplicate { .. } => AdminConfigError::KeyExists {
            key: key.to_string(),
        },
        other => AdminConfigError::from(other),
    }
}
