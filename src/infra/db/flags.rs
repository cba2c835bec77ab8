use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{
        CreateFlagParams, FlagsRepo, FlagsWriteRepo, RepoError, UpdateFlagParams,
    },
    domain::entities::FlagRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct FlagRow {
    id: String,
    project_id: String,
    environment_id: String,
    key: String,
    name: String,
    description: Option<String>,
    enabled: bool,
    default_value: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<FlagRow> for FlagRecord {
    fn from(row: FlagRow) -> Self {
        Self {
            id: row.id,
            project_id: row.project_id,
            environment_id: row.environment_id,
            key: row.key,
            name: row.name,
            description: row.description,
            enabled: row.enabled,
            default_value: row.default_value,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl FlagsRepo for PostgresRepositories {
    async fn list_for_environment(
        &self,
        environment_id: &str,
    ) -> Result<Vec<FlagRecord>, RepoError> {
        let rows = sqlx::query_as::<_, FlagRow>(
            r#"
            SELECT id, project_id, environment_id, key, name, description, enabled,
                   default_value, created_at, updated_at
            FROM flags
            WHERE environment_id = $1
            ORDER BY key
            "#,
        )
        .bind(environment_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(FlagRecord::from).collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<FlagRecord>, RepoError> {
        let row = sqlx::query_as::<_, FlagRow>(
            r#"
            SELECT id, project_id, environment_id, key, name, description, enabled,
                   default_value, created_at, updated_at
            FROM flags
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(FlagRecord::from))
    }
}

#[async_trait]
impl FlagsWriteRepo for PostgresRepositories {
    async fn create_flag(&self, params: CreateFlagParams) -> Result<FlagRecord, RepoError> {
        let row = sqlx::query_as::<_, FlagRow>(
            r#"
            INSERT INTO flags (id, project_id, environment_id, key, name, description,
                               enabled, default_value)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, project_id, environment_id, key, name, description, enabled,
                      default_value, created_at, updated_at
            "#,
        )
        .bind(&params.id)
        .bind(&params.project_id)
        .bind(&params.environment_id)
        .bind(&params.key)
        .bind(&params.name)
        .bind(&params.description)
        .bind(params.enabled)
        .bind(&params.default_value)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(FlagRecord::from(row))
    }

    async fn update_flag(&self, params: UpdateFlagParams) -> Result<FlagRecord, RepoError> {
        let row = sqlx::query_as::<_, FlagRow>(
            r#"
            UPDATE flags
            SET key = $2, name = $3, description = $4, enabled = $5,
                default_value = $6, updated_at = now()
            WHERE id = $1
            RETURNING id, project_id, environment_id, key, name, description, enabled,
                      default_value, created_at, updated_at
            "#,
        )
        .bind(&params.id)
        .bind(&params.key)
        .bind(&params.name)
        .bind(&params.description)
        .bind(params.enabled)
        .bind(&params.default_value)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(FlagRecord::from(row))
    }

    async fn delete_flag(&self, id: &str) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM flags WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
