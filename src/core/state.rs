//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a build or of a single job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Not started yet
    Pending,
    /// Currently running
    Running,
    /// Every gating step succeeded
    Passed,
    /// A script step exited non-zero
    Failed,
    /// The environment could not be provisioned (install, before_script or deploy failure)
    Errored,
    /// Never executed (e.g. the job targets another operating system)
    Skipped,
    /// Stopped before finishing
    Cancelled,
}

impl ExecutionStatus {
    /// Check if the status is final
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Pending | ExecutionStatus::Running)
    }

    /// Whether a build or job with this status counts as green
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Passed | ExecutionStatus::Skipped)
    }

    /// Stable lowercase name, used for persistence and JSON output
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Passed => "passed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Errored => "errored",
            ExecutionStatus::Skipped => "skipped",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }

    /// Inverse of [`ExecutionStatus::as_str`]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ExecutionStatus::Pending),
            "running" => Some(ExecutionStatus::Running),
            "passed" => Some(ExecutionStatus::Passed),
            "failed" => Some(ExecutionStatus::Failed),
            "errored" => Some(ExecutionStatus::Errored),
            "skipped" => Some(ExecutionStatus::Skipped),
            "cancelled" => Some(ExecutionStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not been reached yet
    Pending,
    /// Step is currently running
    Running {
        started_at: DateTime<Utc>,
    },
    /// Command exited with status zero
    Passed {
        output: String,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    /// Command exited non-zero, timed out or could not be spawned
    Failed {
        /// `None` when the process never produced an exit code
        exit_code: Option<i32>,
        error: String,
        output: String,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    /// Step was never executed
    Skipped {
        reason: String,
    },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Passed { .. } | StepState::Failed { .. } | StepState::Skipped { .. }
        )
    }

    /// Whether the command actually ran (passed or failed)
    pub fn was_executed(&self) -> bool {
        matches!(self, StepState::Passed { .. } | StepState::Failed { .. })
    }

    /// Recorded output of an executed step
    pub fn output(&self) -> Option<&str> {
        match self {
            StepState::Passed { output, .. } | StepState::Failed { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Overall build state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution finished
    pub finished_at: Option<DateTime<Utc>>,

    /// Total number of jobs
    pub total_jobs: usize,

    /// Number of finished jobs (any terminal status)
    pub finished_jobs: usize,
}

impl BuildState {
    /// Create a new build state
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            finished_at: None,
            total_jobs: 0,
            finished_jobs: 0,
        }
    }

    /// Mark build as started
    pub fn start(&mut self, total_jobs: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_jobs = total_jobs;
        self.finished_jobs = 0;
    }

    /// Mark build as finished with the given verdict
    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Calculate progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_jobs == 0 {
            return 0.0;
        }
        self.finished_jobs as f64 / self.total_jobs as f64
    }
}

impl Default for BuildState {
    fn default() -> Self {
        Self::new()
    }
}
