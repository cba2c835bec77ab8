//! Assembles public snapshots from the record store.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{instrument, warn};

use crate::application::repos::{ConfigsRepo, EnvironmentsRepo, FlagsRepo, RepoError};
use crate::domain::entities::{EnvironmentRecord, ProjectRecord};
use crate::domain::snapshot::PublicSnapshot;

const METRIC_SNAPSHOT_BUILD_MS: &str = "figflag_snapshot_build_ms";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("environment `{environment_id}` disappeared before its snapshot was built")]
    EnvironmentNotFound { environment_id: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub struct SnapshotBuilder {
    environments: Arc<dyn EnvironmentsRepo>,
    flags: Arc<dyn FlagsRepo>,
    configs: Arc<dyn ConfigsRepo>,
}

impl SnapshotBuilder {
    pub fn new(
        environments: Arc<dyn EnvironmentsRepo>,
        flags: Arc<dyn FlagsRepo>,
        configs: Arc<dyn ConfigsRepo>,
    ) -> Self {
        Self {
            environments,
            flags,
            configs,
        }
    }

    /// Read every flag and config of `environment` and assemble the document.
    ///
    /// The three reads run concurrently; the environment is re-read alongside
    /// them so a row deleted after resolution fails the build instead of
    /// yielding an empty snapshot.
    #[instrument(skip_all, fields(project = %project.slug, environment = %environment.slug))]
    pub async fn build(
        &self,
        project: &ProjectRecord,
        environment: &EnvironmentRecord,
    ) -> Result<PublicSnapshot, SnapshotError> {
        let started_at = Instant::now();

        let (current, flags, configs) = tokio::try_join!(
            self.environments.find_by_id(&environment.id),
            self.flags.list_for_environment(&environment.id),
            self.configs.list_for_environment(&environment.id),
        )?;

        if current.is_none() {
            return Err(SnapshotError::EnvironmentNotFound {
                environment_id: environment.id.clone(),
            });
        }

        let foreign_rows = flags
            .iter()
            .map(|flag| &flag.environment_id)
            .chain(configs.iter().map(|config| &config.environment_id))
            .filter(|id| **id != environment.id)
            .count();
        if foreign_rows > 0 {
            warn!(foreign_rows, "record store returned rows from another environment");
        }
        let flags = flags
            .into_iter()
            .filter(|flag| flag.environment_id == environment.id)
            .collect();
        let configs = configs
            .into_iter()
            .filter(|config| config.environment_id == environment.id)
            .collect();

        let snapshot = PublicSnapshot::assemble(
            &project.slug,
            &environment.slug,
            flags,
            configs,
            OffsetDateTime::now_utc(),
        );

        histogram!(METRIC_SNAPSHOT_BUILD_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::test_support::{InMemoryStore, config, flag};

    fn builder(store: &Arc<InMemoryStore>) -> SnapshotBuilder {
        SnapshotBuilder::new(store.clone(), store.clone(), store.clone())
    }

    async fn resolved(store: &InMemoryStore) -> (ProjectRecord, EnvironmentRecord) {
        let project = crate::application::repos::ProjectsRepo::find_by_slug(store, "acme")
            .await
            .expect("lookup")
            .expect("project");
        let environment =
            crate::application::repos::EnvironmentsRepo::find_by_slug(store, &project.id, "prod")
                .await
                .expect("lookup")
                .expect("environment");
        (project, environment)
    }

    #[tokio::test]
    async fn builds_flags_and_configs_for_the_environment() {
        let store = InMemoryStore::seeded();
        store.insert_flag(flag("flag_old", "env_prod", "old_checkout", false));
        store.insert_flag(flag("flag_elsewhere", "env_other_staging", "leak", true));
        store.insert_config(config("cfg_broken", "env_prod", "banner", Some("not-json{{{")));
        let (project, environment) = resolved(&store).await;

        let snapshot = builder(&store)
            .build(&project, &environment)
            .await
            .expect("snapshot");

        assert_eq!(snapshot.project, "acme");
        assert_eq!(snapshot.environment, "prod");
        assert_eq!(snapshot.flags.len(), 2);
        assert!(snapshot.flags["new_ui"]);
        assert!(!snapshot.flags["old_checkout"]);
        assert!(!snapshot.flags.contains_key("leak"));
        assert_eq!(snapshot.configs["theme"], json!({"color": "blue"}));
        assert_eq!(snapshot.configs["banner"], json!("not-json{{{"));
    }

    #[tokio::test]
    async fn vanished_environment_fails_the_build() {
        let store = InMemoryStore::seeded();
        let (project, environment) = resolved(&store).await;
        store.remove_environment("env_prod");

        let result = builder(&store).build(&project, &environment).await;

        assert!(matches!(
            result,
            Err(SnapshotError::EnvironmentNotFound { environment_id }) if environment_id == "env_prod"
        ));
    }

    #[tokio::test]
    async fn store_failures_propagate() {
        let store = InMemoryStore::seeded();
        let (project, environment) = resolved(&store).await;
        store.fail_reads(true);

        let result = builder(&store).build(&project, &environment).await;

        assert!(matches!(result, Err(SnapshotError::Repo(RepoError::Timeout))));
    }
}
