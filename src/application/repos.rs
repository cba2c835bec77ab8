//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{ConfigRecord, EnvironmentRecord, FlagRecord, ProjectRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[async_trait]
pub trait ProjectsRepo: Send + Sync {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<ProjectRecord>, RepoError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<ProjectRecord>, RepoError>;
}

#[async_trait]
pub trait EnvironmentsRepo: Send + Sync {
    /// Looks an environment up by slug within one project only.
    async fn find_by_slug(
        &self,
        project_id: &str,
        slug: &str,
    ) -> Result<Option<EnvironmentRecord>, RepoError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<EnvironmentRecord>, RepoError>;
}

#[async_trait]
pub trait FlagsRepo: Send + Sync {
    async fn list_for_environment(&self, environment_id: &str)
    -> Result<Vec<FlagRecord>, RepoError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<FlagRecord>, RepoError>;
}

#[async_trait]
pub trait ConfigsRepo: Send + Sync {
    async fn list_for_environment(
        &self,
        environment_id: &str,
    ) -> Result<Vec<ConfigRecord>, RepoError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<ConfigRecord>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreateFlagParams {
    pub id: String,
    pub project_id: String,
    pub environment_id: String,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub default_value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateFlagParams {
    pub id: String,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub default_value: Option<String>,
}

#[async_trait]
pub trait FlagsWriteRepo: Send + Sync {
    async fn create_flag(&self, params: CreateFlagParams) -> Result<FlagRecord, RepoError>;

    async fn update_flag(&self, params: UpdateFlagParams) -> Result<FlagRecord, RepoError>;

    async fn delete_flag(&self, id: &str) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreateConfigParams {
    pub id: String,
    pub project_id: String,
    pub environment_id: String,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateConfigParams {
    pub id: String,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub value: Option<String>,
}

#[async_trait]
pub trait ConfigsWriteRepo: Send + Sync {
    async fn create_config(&self, params: CreateConfigParams) -> Result<ConfigRecord, RepoError>;

    async fn update_config(&self, params: UpdateConfigParams) -> Result<ConfigRecord, RepoError>;

    async fn delete_config(&self, id: &str) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct UpdateEnvironmentParams {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

#[async_trait]
pub trait EnvironmentsWriteRepo: Send + Sync {
    async fn update_environment(
        &self,
        params: UpdateEnvironmentParams,
    ) -> Result<EnvironmentRecord, RepoError>;

    async fn delete_environment(&self, id: &str) -> Result<(), RepoError>;
}

/// Liveness check of the record store.
#[async_trait]
pub trait HealthRepo: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}
