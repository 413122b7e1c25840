//! Command result types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for command execution
///
/// A non-zero exit is not an error; it is reported through [`CommandOutput`].
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to spawn {shell}: {source}")]
    Spawn {
        shell: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("I/O error while reading output: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a command that ran to completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,

    /// Trailing combined stdout/stderr
    pub output: String,
}

impl CommandOutput {
    pub fn new(exit_code: Option<i32>, output: String) -> Self {
        Self { exit_code, output }
    }

    /// Zero exit status
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}
