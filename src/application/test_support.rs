//! In-memory record store and recording collaborators for tests.
//!
//! Built for unit tests and, with the `test-support` feature, for the
//! integration tests that drive the router.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use time::OffsetDateTime;
use time::macros::datetime;

use crate::application::repos::{
    ConfigsRepo, ConfigsWriteRepo, CreateConfigParams, CreateFlagParams, EnvironmentsRepo,
    EnvironmentsWriteRepo, FlagsRepo, FlagsWriteRepo, HealthRepo, ProjectsRepo, RepoError, UpdateConfigParams,
    UpdateEnvironmentParams, UpdateFlagParams,
};
use crate::cache::Invalidator;
use crate::domain::entities::{ConfigRecord, EnvironmentRecord, FlagRecord, ProjectRecord};

const SEEDED_AT: OffsetDateTime = datetime!(2024-01-01 0:00 UTC);

#[derive(Default)]
struct StoreState {
    projects: Vec<ProjectRecord>,
    environments: Vec<EnvironmentRecord>,
    flags: Vec<FlagRecord>,
    configs: Vec<ConfigRecord>,
}

#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<StoreState>,
    reads_fail: AtomicBool,
    version: AtomicU64,
    environment_lookups: AtomicU64,
}

impl InMemoryStore {
    /// `acme/prod` with `new_ui=true` and `theme={"color":"blue"}`, plus a
    /// `staging` environment that belongs to a different project.
    pub fn seeded() -> Arc<Self> {
        let store = Self::default();
        {
            let mut state = store.records();
            state.projects.push(project("proj_acme", "acme"));
            state.projects.push(project("proj_other", "other"));
            state
                .environments
                .push(environment("env_prod", "proj_acme", "prod"));
            state
                .environments
                .push(environment("env_other_staging", "proj_other", "staging"));
            state
                .flags
                .push(flag("flag_new_ui", "env_prod", "new_ui", true));
            state.configs.push(config(
                "cfg_theme",
                "env_prod",
                "theme",
                Some(r#"{"color":"blue"}"#),
            ));
        }
        Arc::new(store)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.reads_fail.store(fail, Ordering::SeqCst);
    }

    /// Number of committed writes so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn environment_lookups(&self) -> u64 {
        self.environment_lookups.load(Ordering::SeqCst)
    }

    pub fn insert_flag(&self, record: FlagRecord) {
        self.records().flags.push(record);
    }

    pub fn insert_config(&self, record: ConfigRecord) {
        self.records().configs.push(record);
    }

    pub fn insert_environment(&self, record: EnvironmentRecord) {
        self.records().environments.push(record);
    }

    pub fn remove_environment(&self, id: &str) {
        self.records()
            .environments
            .retain(|env| env.id != id);
    }

    /// Adds a config with id `cfg_<key>` to `acme/prod`.
    pub fn insert_prod_config(&self, key: &str, value: Option<&str>) {
        self.insert_config(config(&format!("cfg_{key}"), "env_prod", key, value));
    }

    fn records(&self) -> MutexGuard<'_, StoreState> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_reads(&self) -> Result<(), RepoError> {
        if self.reads_fail.load(Ordering::SeqCst) {
            Err(RepoError::Timeout)
        } else {
            Ok(())
        }
    }

    fn commit(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn project(id: &str, slug: &str) -> ProjectRecord {
    ProjectRecord {
        id: id.into(),
        name: slug.to_uppercase(),
        slug: slug.into(),
        description: None,
        created_at: SEEDED_AT,
        updated_at: SEEDED_AT,
    }
}

pub fn environment(id: &str, project_id: &str, slug: &str) -> EnvironmentRecord {
    EnvironmentRecord {
        id: id.into(),
        project_id: project_id.into(),
        name: slug.to_uppercase(),
        slug: slug.into(),
        description: None,
        created_at: SEEDED_AT,
        updated_at: SEEDED_AT,
    }
}

pub fn flag(id: &str, environment_id: &str, key: &str, enabled: bool) -> FlagRecord {
    FlagRecord {
        id: id.into(),
        project_id: "proj_acme".into(),
        environment_id: environment_id.into(),
        key: key.into(),
        name: key.into(),
        description: None,
        enabled,
        default_value: None,
        created_at: SEEDED_AT,
        updated_at: SEEDED_AT,
    }
}

pub fn config(
    id: &str,
    environment_id: &str,
    key: &str,
    value: Option<&str>,
) -> ConfigRecord {
    ConfigRecord {
        id: id.into(),
        project_id: "proj_acme".into(),
        environment_id: environment_id.into(),
        key: key.into(),
        name: key.into(),
        description: None,
        value: value.map(str::to_string),
        created_at: SEEDED_AT,
        updated_at: SEEDED_AT,
    }
}

fn duplicate(constraint: &str) -> RepoError {
    RepoError::Duplicate {
        constraint: constraint.into(),
    }
}

#[async_trait]
impl ProjectsRepo for InMemoryStore {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<ProjectRecord>, RepoError> {
        self.check_reads()?;
        let state = self.records();
        Ok(state.projects.iter().find(|p| p.slug == slug).cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ProjectRecord>, RepoError> {
        self.check_reads()?;
        let state = self.records();
        Ok(state.projects.iter().find(|p| p.id == id).cloned())
    }
}

#[async_trait]
impl EnvironmentsRepo for InMemoryStore {
    async fn find_by_slug(
        &self,
        project_id: &str,
        slug: &str,
    ) -> Result<Option<EnvironmentRecord>, RepoError> {
        self.check_reads()?;
        self.environment_lookups.fetch_add(1, Ordering::SeqCst);
        let state = self.records();
        Ok(state
            .environments
            .iter()
            .find(|e| e.project_id == project_id && e.slug == slug)
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<EnvironmentRecord>, RepoError> {
        self.check_reads()?;
        let state = self.records();
        Ok(state.environments.iter().find(|e| e.id == id).cloned())
    }
}

#[async_trait]
impl FlagsRepo for InMemoryStore {
    async fn list_for_environment(
        &self,
        environment_id: &str,
    ) -> Result<Vec<FlagRecord>, RepoError> {
        self.check_reads()?;
        let state = self.records();
        Ok(state
            .flags
            .iter()
            .filter(|f| f.environment_id == environment_id)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<FlagRecord>, RepoError> {
        self.check_reads()?;
        let state = self.records();
        Ok(state.flags.iter().find(|f| f.id == id).cloned())
    }
}

#[async_trait]
impl ConfigsRepo for InMemoryStore {
    async fn list_for_environment(
        &self,
        environment_id: &str,
    ) -> Result<Vec<ConfigRecord>, RepoError> {
        self.check_reads()?;
        let state = self.records();
        Ok(state
            .configs
            .iter()
            .filter(|c| c.environment_id == environment_id)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ConfigRecord>, RepoError> {
        self.check_reads()?;
        let state = self.records();
        Ok(state.configs.iter().find(|c| c.id == id).cloned())
    }
}

#[async_trait]
impl FlagsWriteRepo for InMemoryStore {
    async fn create_flag(&self, params: CreateFlagParams) -> Result<FlagRecord, RepoError> {
        let mut state = self.records();
        if state
            .flags
            .iter()
            .any(|f| f.environment_id == params.environment_id && f.key == params.key)
        {
            return Err(duplicate("flags_environment_id_key_key"));
        }
        let record = FlagRecord {
            id: params.id,
            project_id: params.project_id,
            environment_id: params.environment_id,
            key: params.key,
            name: params.name,
            description: params.description,
            enabled: params.enabled,
            default_value: params.default_value,
            created_at: SEEDED_AT,
            updated_at: SEEDED_AT,
        };
        state.flags.push(record.clone());
        self.commit();
        Ok(record)
    }

    async fn update_flag(&self, params: UpdateFlagParams) -> Result<FlagRecord, RepoError> {
        let mut state = self.records();
        let environment_id = state
            .flags
            .iter()
            .find(|f| f.id == params.id)
            .map(|f| f.environment_id.clone())
            .ok_or(RepoError::NotFound)?;
        if state
            .flags
            .iter()
            .any(|f| f.id != params.id && f.environment_id == environment_id && f.key == params.key)
        {
            return Err(duplicate("flags_environment_id_key_key"));
        }
        let record = state
            .flags
            .iter_mut()
            .find(|f| f.id == params.id)
            .ok_or(RepoError::NotFound)?;
        record.key = params.key;
        record.name = params.name;
        record.description = params.description;
        record.enabled = params.enabled;
        record.default_value = params.default_value;
        let updated = record.clone();
        self.commit();
        Ok(updated)
    }

    async fn delete_flag(&self, id: &str) -> Result<(), RepoError> {
        self.records().flags.retain(|f| f.id != id);
        self.commit();
        Ok(())
    }
}

#[async_trait]
impl ConfigsWriteRepo for InMemoryStore {
    async fn create_config(&self, params: CreateConfigParams) -> Result<ConfigRecord, RepoError> {
        let mut state = self.records();
        if state
            .configs
            .iter()
            .any(|c| c.environment_id == params.environment_id && c.key == params.key)
        {
            return Err(duplicate("configs_environment_id_key_key"));
        }
        let record = ConfigRecord {
            id: params.id,
            project_id: params.project_id,
            environment_id: params.environment_id,
            key: params.key,
            name: params.name,
            description: params.description,
            value: params.value,
            created_at: SEEDED_AT,
            updated_at: SEEDED_AT,
        };
        state.configs.push(record.clone());
        self.commit();
        Ok(record)
    }

    async fn update_config(&self, params: UpdateConfigParams) -> Result<ConfigRecord, RepoError> {
        let mut state = self.records();
        let environment_id = state
            .configs
            .iter()
            .find(|c| c.id == params.id)
            .map(|c| c.environment_id.clone())
            .ok_or(RepoError::NotFound)?;
        if state
            .configs
            .iter()
            .any(|c| c.id != params.id && c.environment_id == environment_id && c.key == params.key)
        {
            return Err(duplicate("configs_environment_id_key_key"));
        }
        let record = state
            .configs
            .iter_mut()
            .find(|c| c.id == params.id)
            .ok_or(RepoError::NotFound)?;
        record.key = params.key;
        record.name = params.name;
        record.description = params.description;
        record.value = params.value;
        let updated = record.clone();
        self.commit();
        Ok(updated)
    }

    async fn delete_config(&self, id: &str) -> Result<(), RepoError> {
        self.records().configs.retain(|c| c.id != id);
        self.commit();
        Ok(())
    }
}

#[async_trait]
impl EnvironmentsWriteRepo for InMemoryStore {
    async fn update_environment(
        &self,
        params: UpdateEnvironmentParams,
    ) -> Result<EnvironmentRecord, RepoError> {
        let mut state = self.records();
        let project_id = state
            .environments
            .iter()
            .find(|e| e.id == params.id)
            .map(|e| e.project_id.clone())
            .ok_or(RepoError::NotFound)?;
        if state
            .environments
            .iter()
            .any(|e| e.id != params.id && e.project_id == project_id && e.slug == params.slug)
        {
            return Err(duplicate("environments_project_id_slug_key"));
        }
        let record = state
            .environments
            .iter_mut()
            .find(|e| e.id == params.id)
            .ok_or(RepoError::NotFound)?;
        record.name = params.name;
        record.slug = params.slug;
        record.description = params.description;
        let updated = record.clone();
        self.commit();
        Ok(updated)
    }

    async fn delete_environment(&self, id: &str) -> Result<(), RepoError> {
        self.remove_environment(id);
        self.commit();
        Ok(())
    }
}

#[async_trait]
impl HealthRepo for InMemoryStore {
    async fn ping(&self) -> Result<(), RepoError> {
        self.check_reads()
    }
}

/// Records every invalidation together with the store version it observed.
pub struct RecordingInvalidator {
    store: Arc<InMemoryStore>,
    calls: Mutex<Vec<(String, String, u64)>>,
}

impl RecordingInvalidator {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self {
            store,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, String, u64)> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Invalidator for RecordingInvalidator {
    async fn invalidate(&self, project_slug: &str, environment_slug: &str) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push((
            project_slug.to_string(),
            environment_slug.to_string(),
            self.store.version(),
        ));
    }
}
