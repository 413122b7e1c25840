//! SQLite-based persistence store

use crate::core::{ExecutionStatus, OperatingSystem};
use crate::persistence::{BuildSummary, JobSummary, PersistenceBackend};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS builds (
        id TEXT PRIMARY KEY,
        build_name TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT,
        progress REAL NOT NULL DEFAULT 0.0,
        finished_jobs INTEGER NOT NULL DEFAULT 0,
        total_jobs INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        build_id TEXT NOT NULL REFERENCES builds(id) ON DELETE CASCADE,
        number INTEGER NOT NULL,
        name TEXT NOT NULL,
        os TEXT NOT NULL,
        interpreter_version TEXT,
        status TEXT NOT NULL,
        failed_step TEXT,
        duration_secs REAL,
        PRIMARY KEY (build_id, number)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_build_name ON builds(build_name)",
    "CREATE INDEX IF NOT EXISTS idx_started_at ON builds(started_at)",
];

/// SQLite build store
pub struct SqliteBuildStore {
    pool: SqlitePool,
}

impl SqliteBuildStore {
    /// Open (or create) a store at `db_path`
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.as_ref().display()))?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Location of the history database under the user's data directory
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cimatrix")
            .join("builds.db")
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let db_path = Self::default_path();
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Self::new(db_path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to initialize schema")?;
        }
        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn parse_status(value: &str) -> Result<ExecutionStatus> {
        ExecutionStatus::parse(value).ok_or_else(|| anyhow!("Unknown status '{}' in history", value))
    }

    fn build_from_row(row: &SqliteRow) -> Result<BuildSummary> {
        Ok(BuildSummary {
            execution_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            build_name: row.get("build_name"),
            status: Self::parse_status(&row.get::<String, _>("status"))?,
            started_at: Self::from_naive(row.get("started_at")),
            finished_at: row
                .get::<Option<NaiveDateTime>, _>("finished_at")
                .map(Self::from_naive),
            progress: row.get("progress"),
            finished_jobs: row.get::<i64, _>("finished_jobs") as usize,
            total_jobs: row.get::<i64, _>("total_jobs") as usize,
            jobs: Vec::new(),
        })
    }

    fn job_from_row(row: &SqliteRow) -> Result<JobSummary> {
        Ok(JobSummary {
            number: row.get::<i64, _>("number") as usize,
            name: row.get("name"),
            os: row.get::<String, _>("os").parse::<OperatingSystem>()?,
            interpreter_version: row.get("interpreter_version"),
            status: Self::parse_status(&row.get::<String, _>("status"))?,
            failed_step: row.get("failed_step"),
            duration_secs: row.get("duration_secs"),
        })
    }

    async fn load_jobs(&self, execution_id: Uuid) -> Result<Vec<JobSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT number, name, os, interpreter_version, status, failed_step, duration_secs
            FROM jobs
            WHERE build_id = ?1
            ORDER BY number ASC
            "#,
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to load jobs")?;

        rows.iter().map(Self::job_from_row).collect()
    }

    /// Delete a build and its jobs
    pub async fn delete_build(&self, execution_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM builds WHERE id = ?1")
            .bind(execution_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete build")?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteBuildStore {
    async fn save_build(&self, build: &BuildSummary) -> Result<()> {
        let id = build.execution_id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO builds
            (id, build_name, status, started_at, finished_at, progress, finished_jobs, total_jobs)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&id)
        .bind(&build.build_name)
        .bind(build.status.as_str())
        .bind(Self::to_naive(build.started_at))
        .bind(build.finished_at.map(Self::to_naive))
        .bind(build.progress)
        .bind(build.finished_jobs as i64)
        .bind(build.total_jobs as i64)
        .execute(&mut *tx)
        .await
        .context("Failed to save build")?;

        sqlx::query("DELETE FROM jobs WHERE build_id = ?1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        for job in &build.jobs {
            sqlx::query(
                r#"
                INSERT INTO jobs
                (build_id, number, name, os, interpreter_version, status, failed_step, duration_secs)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&id)
            .bind(job.number as i64)
            .bind(&job.name)
            .bind(job.os.as_str())
            .bind(&job.interpreter_version)
            .bind(job.status.as_str())
            .bind(&job.failed_step)
            .bind(job.duration_secs)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to save job {}", job.number))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_build(&self, execution_id: Uuid) -> Result<Option<BuildSummary>> {
        let row = sqlx::query(
            r#"
            SELECT id, build_name, status, started_at, finished_at, progress, finished_jobs, total_jobs
            FROM builds
            WHERE id = ?1
            "#,
        )
        .bind(execution_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load build")?;

        match row {
            Some(row) => {
                let mut build = Self::build_from_row(&row)?;
                build.jobs = self.load_jobs(execution_id).await?;
                Ok(Some(build))
            }
            None => Ok(None),
        }
    }

    async fn list_builds(&self, build_name: &str) -> Result<Vec<BuildSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, build_name, status, started_at, finished_at, progress, finished_jobs, total_jobs
            FROM builds
            WHERE build_name = ?1
            ORDER BY started_at DESC
            "#,
        )
        .bind(build_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list builds")?;

        let mut builds = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut build = Self::build_from_row(row)?;
            build.jobs = self.load_jobs(build.execution_id).await?;
            builds.push(build);
        }
        Ok(builds)
    }

    async fn list_build_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT build_name
            FROM builds
            ORDER BY build_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list build names")?;

        Ok(rows.iter().map(|row| row.get("build_name")).collect())
    }
}
