//! Job domain model

use crate::core::{
    config::{CiConfig, OperatingSystem},
    env::JobEnvironment,
    phase::Phase,
    state::{ExecutionStatus, StepState},
    step::Step,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One cell of the build matrix, with its plan and runtime state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// 1-based position in the expanded matrix
    pub number: usize,

    pub os: OperatingSystem,

    /// Language of the interpreter axis, if any
    pub language: Option<String>,

    /// Interpreter version, if the matrix has an interpreter axis
    pub interpreter_version: Option<String>,

    /// `env.matrix` row this job was expanded from
    pub env_row: Option<String>,

    /// Fully resolved environment
    pub env: JobEnvironment,

    /// Steps in execution order
    pub steps: Vec<Step>,

    pub status: ExecutionStatus,

    pub started_at: Option<DateTime<Utc>>,

    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a pending job with the step plan of `config`
    pub fn new(
        number: usize,
        os: OperatingSystem,
        language: Option<String>,
        interpreter_version: Option<String>,
        env_row: Option<String>,
        env: JobEnvironment,
        config: &CiConfig,
    ) -> Self {
        Job {
            number,
            os,
            language,
            interpreter_version,
            env_row,
            env,
            steps: Self::plan(config),
            status: ExecutionStatus::Pending,
            started_at: None,
            finished_at: None,
        }
    }

    /// Lay out every phase's commands in lifecycle order
    fn plan(config: &CiConfig) -> Vec<Step> {
        let deploy_enabled = config.deploy_enabled();
        Phase::ALL
            .iter()
            .flat_map(|&phase| {
                config
                    .phase_steps(phase)
                    .iter()
                    .enumerate()
                    .map(move |(index, step_config)| {
                        let mut step = Step::from_config(phase, index, step_config);
                        if phase == Phase::Deploy && !deploy_enabled {
                            step.disabled = true;
                        }
                        step
                    })
            })
            .collect()
    }

    /// Display name, e.g. `#2 osx python 3.4 PY_FLAGS=-x`
    pub fn name(&self) -> String {
        let mut name = format!("#{} {}", self.number, self.os);
        if let Some(version) = &self.interpreter_version {
            match &self.language {
                Some(language) => name.push_str(&format!(" {} {}", language, version)),
                None => name.push_str(&format!(" {}", version)),
            }
        }
        if let Some(row) = &self.env_row {
            name.push(' ');
            name.push_str(&self.env.mask(row));
        }
        name
    }

    /// Get a step by ID
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Get a mutable step by ID
    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// Steps of one phase
    pub fn steps_in(&self, phase: Phase) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(move |s| s.phase == phase)
    }

    /// IDs of the steps that actually ran, in order
    pub fn executed_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.state.was_executed())
            .map(|s| s.id.as_str())
            .collect()
    }

    /// The gating step that decided a Failed or Errored verdict
    pub fn failed_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| {
            s.phase.failure_status().is_some() && matches!(s.state, StepState::Failed { .. })
        })
    }

    /// Mark the job and every one of its steps as skipped
    pub fn skip(&mut self, reason: &str) {
        for step in &mut self.steps {
            step.state = StepState::Skipped {
                reason: reason.to_string(),
            };
        }
        self.status = ExecutionStatus::Skipped;
        let now = Utc::now();
        self.started_at.get_or_insert(now);
        self.finished_at = Some(now);
    }

    /// Mark the job Errored without running any step
    pub fn abort(&mut self, reason: &str) {
        for step in &mut self.steps {
            step.state = StepState::Skipped {
                reason: reason.to_string(),
            };
        }
        self.status = ExecutionStatus::Errored;
        let now = Utc::now();
        self.started_at.get_or_insert(now);
        self.finished_at = Some(now);
    }

    /// Wall-clock duration of a finished job
    pub fn duration(&self) -> Option<std::time::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end.signed_duration_since(start).to_std().ok(),
            _ => None,
        }
    }
}
