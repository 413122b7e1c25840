//! Persistence layer for build history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteBuildStore;

pub use crate::core::ExecutionStatus;
use crate::core::{Build, Job, OperatingSystem};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Summary of one job of a recorded build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    /// 1-based position in the matrix
    pub number: usize,

    /// Display name (secrets masked)
    pub name: String,

    pub os: OperatingSystem,

    pub interpreter_version: Option<String>,

    pub status: ExecutionStatus,

    /// ID of the step that failed or errored the job
    pub failed_step: Option<String>,

    /// Wall-clock duration in seconds
    pub duration_secs: Option<f64>,
}

impl JobSummary {
    pub fn from_job(job: &Job) -> Self {
        JobSummary {
            number: job.number,
            name: job.name(),
            os: job.os,
            interpreter_version: job.interpreter_version.clone(),
            status: job.status,
            failed_step: job.failed_step().map(|s| s.id.clone()),
            duration_secs: job.duration().map(|d| d.as_secs_f64()),
        }
    }
}

/// Summary of a build execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Build name
    pub build_name: String,

    /// Build verdict
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: DateTime<Utc>,

    /// When execution finished (if finished)
    pub finished_at: Option<DateTime<Utc>>,

    /// Progress (0.0 to 1.0)
    pub progress: f64,

    /// Number of finished jobs
    pub finished_jobs: usize,

    /// Total number of jobs
    pub total_jobs: usize,

    /// Per-job results in matrix order
    pub jobs: Vec<JobSummary>,
}

impl BuildSummary {
    /// Number of jobs with the given status
    pub fn count(&self, status: ExecutionStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a build, replacing any earlier record with the same ID
    async fn save_build(&self, build: &BuildSummary) -> Result<()>;

    /// Load a build by ID
    async fn load_build(&self, execution_id: Uuid) -> Result<Option<BuildSummary>>;

    /// List builds with the given name, newest first
    async fn list_builds(&self, build_name: &str) -> Result<Vec<BuildSummary>>;

    /// List all build names, sorted
    async fn list_build_names(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    builds: tokio::sync::RwLock<HashMap<Uuid, BuildSummary>>,
    by_name: tokio::sync::RwLock<HashMap<String, Vec<Uuid>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            builds: tokio::sync::RwLock::new(HashMap::new()),
            by_name: tokio::sync::RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_build(&self, build: &BuildSummary) -> Result<()> {
        let mut builds = self.builds.write().await;
        let replaced = builds.insert(build.execution_id, build.clone()).is_some();

        if !replaced {
            let mut by_name = self.by_name.write().await;
            by_name
                .entry(build.build_name.clone())
                .or_default()
                .push(build.execution_id);
        }

        Ok(())
    }

    async fn load_build(&self, execution_id: Uuid) -> Result<Option<BuildSummary>> {
        let builds = self.builds.read().await;
        Ok(builds.get(&execution_id).cloned())
    }

    async fn list_builds(&self, build_name: &str) -> Result<Vec<BuildSummary>> {
        let builds = self.builds.read().await;
        let by_name = self.by_name.read().await;

        let mut result: Vec<BuildSummary> = by_name
            .get(build_name)
            .map(|ids| ids.iter().filter_map(|id| builds.get(id).cloned()).collect())
            .unwrap_or_default();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_build_names(&self) -> Result<Vec<String>> {
        let by_name = self.by_name.read().await;
        let mut names: Vec<String> = by_name.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Create a summary from a build
pub fn create_summary(build: &Build) -> BuildSummary {
    BuildSummary {
        execution_id: build.state.execution_id,
        build_name: build.name.clone(),
        status: build.state.status,
        started_at: build.state.started_at.unwrap_or_else(Utc::now),
        finished_at: build.state.finished_at,
        progress: build.state.progress(),
        finished_jobs: build.state.finished_jobs,
        total_jobs: build.state.total_jobs,
        jobs: build.jobs.iter().map(JobSummary::from_job).collect(),
    }
}
