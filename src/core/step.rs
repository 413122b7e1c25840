//! Step domain model

use crate::core::{config::StepConfig, phase::Phase, state::StepState};
use serde::{Deserialize, Serialize};

/// A single command in a job's plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Identifier of the form `<phase>.<n>`, e.g. `script.2` (1-based)
    pub id: String,

    /// Phase the step belongs to
    pub phase: Phase,

    /// Optional human-readable name
    pub name: Option<String>,

    /// Shell command
    pub command: String,

    /// Disabled steps are planned but never run
    pub disabled: bool,

    /// Runtime state
    pub state: StepState,
}

impl Step {
    /// Create a step from a step config
    pub fn from_config(phase: Phase, index: usize, config: &StepConfig) -> Self {
        Step {
            id: format!("{}.{}", phase.key(), index + 1),
            phase,
            name: config.name().map(str::to_string),
            command: config.command().to_string(),
            disabled: config.is_disabled(),
            state: StepState::Pending,
        }
    }

    /// Label used in output: the name when given, else the command
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.command)
    }

    /// Exit code of a finished step
    pub fn exit_code(&self) -> Option<i32> {
        match &self.state {
            StepState::Passed { .. } => Some(0),
            StepState::Failed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}
