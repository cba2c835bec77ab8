use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{
        ConfigsRepo, ConfigsWriteRepo, CreateConfigParams, RepoError, UpdateConfigParams,
    },
    domain::entities::ConfigRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ConfigRow {
    id: String,
    project_id: String,
    environment_id: String,
    key: String,
    name: String,
    description: Option<String>,
    value: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ConfigRow> for ConfigRecord {
    fn from(row: ConfigRow) -> Self {
        Self {
            id: row.id,
            project_id: row.project_id,
            environment_id: row.environment_id,
            key: row.key,
            name: row.name,
            description: row.description,
            value: row.value,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ConfigsRepo for PostgresRepositories {
    async fn list_for_environment(
        &self,
        environment_id: &str,
    ) -> Result<Vec<ConfigRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ConfigRow>(
            r#"
            SELECT id, project_id, environment_id, key, name, description, value,
                   created_at, updated_at
            FROM configs
            WHERE environment_id = $1
            ORDER BY key
            "#,
        )
        .bind(environment_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ConfigRecord::from).collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ConfigRecord>, RepoError> {
        let row = sqlx::query_as::<_, ConfigRow>(
            r#"
            SELECT id, project_id, environment_id, key, name, description, value,
                   created_at, updated_at
            FROM configs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ConfigRecord::from))
    }
}

#[async_trait]
impl ConfigsWriteRepo for PostgresRepositories {
    async fn create_config(&self, params: CreateConfigParams) -> Result<ConfigRecord, RepoError> {
        let row = sqlx::query_as::<_, ConfigRow>(
            r#"
            INSERT INTO configs (id, project_id, environment_id, key, name, description, value)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, project_id, environment_id, key, name, description, value,
                      created_at, updated_at
            "#,
        )
        .bind(&params.id)
        .bind(&params.project_id)
        .bind(&params.environment_id)
        .bind(&params.key)
        .bind(&params.name)
        .bind(&params.description)
        .bind(&params.value)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ConfigRecord::from(row))
    }

    async fn update_config(&self, params: UpdateConfigParams) -> Result<ConfigRecord, RepoError> {
        let row = sqlx::query_as::<_, ConfigRow>(
            r#"
            UPDATE configs
            SET key = $2, name = $3, description = $4, value = $5, updated_at = now()
            WHERE id = $1
            RETURNING id, project_id, environment_id, key, name, description, value,
                      created_at, updated_at
            "#,
        )
        .bind(&params.id)
        .bind(&params.key)
        .bind(&params.name)
        .bind(&params.description)
        .bind(&params.value)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ConfigRecord::from(row))
    }

    async fn delete_config(&self, id: &str) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM configs WHERE id = $1")
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
