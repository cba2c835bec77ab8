use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{EnvironmentsRepo, ProjectsRepo, RepoError},
    domain::entities::{EnvironmentRecord, ProjectRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: String,
    name: String,
    slug: String,
    description: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ProjectRow> for ProjectRecord {
    fn from(row: ProjectRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct EnvironmentRow {
    id: String,
    project_id: String,
    name: String,
    slug: String,
    description: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<EnvironmentRow> for EnvironmentRecord {
    fn from(row: EnvironmentRow) -> Self {
        Self {
            id: row.id,
            project_id: row.project_id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ProjectsRepo for PostgresRepositories {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<ProjectRecord>, RepoError> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, name, slug, description, created_at, updated_at
            FROM projects
            WHERE slug = $1
            "#,
        )
        .bind(slug)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ProjectRecord::from))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ProjectRecord>, RepoError> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, name, slug, description, created_at, updated_at
            FROM projects
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ProjectRecord::from))
    }
}

#[async_trait]
impl EnvironmentsRepo for PostgresRepositories {
    async fn find_by_slug(
        &self,
        project_id: &str,
        slug: &str,
    ) -> Result<Option<EnvironmentRecord>, RepoError> {
        let row = sqlx::query_as::<_, EnvironmentRow>(
            r#"
            SELECT id, project_id, name, slug, description, created_at, updated_at
            FROM environments
            WHERE project_id = $1 AND slug = $2
            "#,
        )
        .bind(project_id)
        .bind(slug)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(EnvironmentRecord::from))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<EnvironmentRecord>, RepoError> {
        let row = sqlx::query_as::<_, EnvironmentRow>(
            r#"
            SELECT id, project_id, name, slug, description, created_at, updated_at
            FROM environments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(EnvironmentRecord::from))
    }
}
