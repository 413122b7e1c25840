//! Command runner configuration

use std::path::PathBuf;

/// Host variables forwarded into every job
pub const PASSTHROUGH_VARS: &[&str] = &[
    "PATH", "HOME", "USER", "LOGNAME", "SHELL", "TERM", "TMPDIR", "LANG",
];

/// Configuration for the shell runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Shell used as `<shell> -c <command>`
    pub shell: String,

    /// Working directory; `None` keeps the runner's own
    pub workdir: Option<PathBuf>,

    /// Host variables copied into each job before the job's own variables
    pub passthrough: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            workdir: None,
            passthrough: PASSTHROUGH_VARS.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }
}
