use async_trait::async_trait;

use crate::{
    application::repos::{EnvironmentsWriteRepo, RepoError, UpdateEnvironmentParams},
    domain::entities::EnvironmentRecord,
};

use super::{PostgresRepositories, map_sqlx_error, projects::EnvironmentRow};

#[async_trait]
impl EnvironmentsWriteRepo for PostgresRepositories {
    async fn update_environment(
        &self,
        params: UpdateEnvironmentParams,
    ) -> Result<EnvironmentRecord, RepoError> {
        let row = sqlx::query_as::<_, EnvironmentRow>(
            r#"
            UPDATE environments
            SET name = $2, slug = $3, description = $4, updated_at = now()
            WHERE id = $1
            RETURNING id, project_id, name, slug, description, created_at, updated_at
            "#,
        )
        .bind(&params.id)
        .bind(&params.name)
        .bind(&params.slug)
        .bind(&params.description)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(EnvironmentRecord::from(row))
    }

    async fn delete_environment(&self, id: &str) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM environments WHERE id = $1")
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
