//! Command runners for executing step commands

pub mod config;
pub mod output;
pub mod shell;
pub mod streaming;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use config::{RunnerConfig, PASSTHROUGH_VARS};
pub use output::{CommandOutput, RunnerError};
pub use shell::ShellRunner;
pub use streaming::{OutputSink, OutputTail, Stream, MAX_OUTPUT_LINES};

/// Everything needed to run one step command
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    /// Shell command line
    pub command: String,

    /// Job variables, applied on top of the passthrough variables
    pub env: BTreeMap<String, String>,

    /// Wall-clock limit in seconds
    pub timeout_secs: u64,

    /// Directory to run in, overriding the runner's configured workdir
    pub workdir: Option<PathBuf>,
}

/// Trait for command execution - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion, streaming its output lines to `sink`
    async fn run(
        &self,
        invocation: &CommandInvocation,
        sink: Option<&dyn OutputSink>,
    ) -> Result<CommandOutput, RunnerError>;
}
