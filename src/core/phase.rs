//! Job lifecycle phases and their gating rules

use crate::core::state::ExecutionStatus;
use serde::{Deserialize, Serialize};

/// A named group of commands in a job's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    BeforeInstall,
    Install,
    BeforeScript,
    Script,
    AfterSuccess,
    AfterFailure,
    Deploy,
    AfterScript,
}

impl Phase {
    /// Every phase in execution order
    pub const ALL: [Phase; 8] = [
        Phase::BeforeInstall,
        Phase::Install,
        Phase::BeforeScript,
        Phase::Script,
        Phase::AfterSuccess,
        Phase::AfterFailure,
        Phase::Deploy,
        Phase::AfterScript,
    ];

    /// YAML key of the phase
    pub fn key(&self) -> &'static str {
        match self {
            Phase::BeforeInstall => "before_install",
            Phase::Install => "install",
            Phase::BeforeScript => "before_script",
            Phase::Script => "script",
            Phase::AfterSuccess => "after_success",
            Phase::AfterFailure => "after_failure",
            Phase::Deploy => "deploy",
            Phase::AfterScript => "after_script",
        }
    }

    /// Job status caused by a failing step of this phase.
    ///
    /// `None` means the failure is recorded on the step only.
    pub fn failure_status(&self) -> Option<ExecutionStatus> {
        match self {
            Phase::BeforeInstall | Phase::Install | Phase::BeforeScript | Phase::Deploy => {
                Some(ExecutionStatus::Errored)
            }
            Phase::Script => Some(ExecutionStatus::Failed),
            Phase::AfterSuccess | Phase::AfterFailure | Phase::AfterScript => None,
        }
    }

    /// Decide whether steps of this phase run, given the job's verdict so far.
    ///
    /// `verdict` is `Passed` while no gating step has failed. Returns the skip
    /// reason when the phase must not run.
    pub fn skip_reason(&self, verdict: ExecutionStatus) -> Option<&'static str> {
        let clean = verdict == ExecutionStatus::Passed;
        match self {
            Phase::BeforeInstall | Phase::Install | Phase::BeforeScript | Phase::Script => {
                (!clean).then_some("a previous step failed")
            }
            Phase::AfterSuccess | Phase::Deploy => (!clean).then_some("job did not pass"),
            Phase::AfterFailure => clean.then_some("job passed"),
            Phase::AfterScript => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}
