//! Build domain model

use crate::core::{
    config::CiConfig,
    job::Job,
    matrix::MatrixExpander,
    state::{BuildState, ExecutionStatus},
};
use anyhow::Result;
use regex::Regex;
use std::collections::HashMap;

/// Inputs that are not part of the config file
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Values for `secure` env entries
    pub secrets: HashMap<String, String>,

    /// Variables set after every config-defined one
    pub overrides: Vec<(String, String)>,

    /// Keep only jobs whose name matches
    pub only: Option<Regex>,
}

/// One run of every job of a matrix
#[derive(Debug, Clone)]
pub struct Build {
    /// Build name
    pub name: String,

    /// Jobs in matrix order
    pub jobs: Vec<Job>,

    /// Execution state
    pub state: BuildState,

    /// Per-step timeout in seconds
    pub step_timeout_secs: u64,
}

impl Build {
    /// Expand a config into a pending build
    pub fn from_config(config: &CiConfig, options: &BuildOptions) -> Result<Self> {
        let mut jobs = MatrixExpander::new(config)
            .with_secrets(options.secrets.clone())
            .with_overrides(options.overrides.clone())
            .expand()?;

        if let Some(only) = &options.only {
            jobs.retain(|job| only.is_match(&job.name()));
        }

        Ok(Build {
            name: config.display_name().to_string(),
            jobs,
            state: BuildState::new(),
            step_timeout_secs: config.step_timeout_secs(),
        })
    }

    /// Get a job by number
    pub fn job(&self, number: usize) -> Option<&Job> {
        self.jobs.iter().find(|j| j.number == number)
    }

    /// Get a mutable job by number
    pub fn job_mut(&mut self, number: usize) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.number == number)
    }

    /// Check if every job reached a final status
    pub fn is_complete(&self) -> bool {
        self.jobs.iter().all(|j| j.status.is_terminal())
    }

    /// Jobs with the given status
    pub fn jobs_with_status(&self, status: ExecutionStatus) -> Vec<&Job> {
        self.jobs.iter().filter(|j| j.status == status).collect()
    }

    /// Overall verdict derived from the job statuses
    ///
    /// Errored beats Failed beats Passed; a build whose jobs were all
    /// skipped is Skipped.
    pub fn verdict(&self) -> ExecutionStatus {
        let any = |status: ExecutionStatus| self.jobs.iter().any(|j| j.status == status);
        if any(ExecutionStatus::Errored) {
            ExecutionStatus::Errored
        } else if any(ExecutionStatus::Failed) {
            ExecutionStatus::Failed
        } else if any(ExecutionStatus::Cancelled) {
            ExecutionStatus::Cancelled
        } else if !self.jobs.is_empty() && self.jobs.iter().all(|j| j.status == ExecutionStatus::Skipped) {
            ExecutionStatus::Skipped
        } else {
            ExecutionStatus::Passed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build() -> Build {
        let config = CiConfig::from_yaml(
            r#"
name: demo
language: python
os: [linux, osx]
python: ["2.7", "3.5"]
script: [make]
"#,
        )
        .unwrap();
        Build::from_config(&config, &BuildOptions::default()).unwrap()
    }

    #[test]
    fn test_from_config() {
        let build = build();
        assert_eq!(build.name, "demo");
        assert_eq!(build.jobs.len(), 4);
        assert!(!build.is_complete());
        assert_eq!(build.job(3).map(|j| j.os.as_str()), Some("osx"));
    }

    #[test]
    fn test_only_filter() {
        let config = CiConfig::from_yaml("os: [linux, osx]\nscript: [make]").unwrap();
        let options = BuildOptions {
            only: Some(Regex::new("osx").unwrap()),
            ..Default::default()
        };
        let build = Build::from_config(&config, &options).unwrap();
        assert_eq!(build.jobs.len(), 1);
        assert_eq!(build.jobs[0].number, 2);
    }

    #[test]
    fn test_verdict_precedence() {
        let mut build = build();
        for job in &mut build.jobs {
            job.status = ExecutionStatus::Passed;
        }
        assert_eq!(build.verdict(), ExecutionStatus::Passed);

        build.jobs[0].status = ExecutionStatus::Skipped;
        assert_eq!(build.verdict(), ExecutionStatus::Passed);

        build.jobs[1].status = ExecutionStatus::Failed;
        assert_eq!(build.verdict(), ExecutionStatus::Failed);

        build.jobs[2].status = ExecutionStatus::Errored;
        assert_eq!(build.verdict(), ExecutionStatus::Errored);
    }

    #[test]
    fn test_all_skipped() {
        let mut build = build();
        for job in &mut build.jobs {
            job.skip("host mismatch");
        }
        assert!(build.is_complete());
        assert_eq!(build.verdict(), ExecutionStatus::Skipped);
    }
}
