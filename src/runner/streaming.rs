//! Line streaming for command execution
//!
//! While a step runs, its stdout and stderr are read line-by-line. Each line
//! is delivered to an [`OutputSink`] for live display and kept in a bounded
//! [`OutputTail`] that becomes the step's recorded output.
//!
//! # Example
//!
//! ```
//! use cimatrix::runner::{OutputSink, Stream};
//!
//! struct Printer;
//!
//! impl OutputSink for Printer {
//!     fn on_line(&self, stream: Stream, line: &str) {
//!         match stream {
//!             Stream::Stdout => println!("{}", line),
//!             Stream::Stderr => eprintln!("{}", line),
//!         }
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of trailing lines kept per step
pub const MAX_OUTPUT_LINES: usize = 200;

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Receives output lines as they are produced
///
/// This trait is object-safe and is passed around as `&dyn OutputSink`.
pub trait OutputSink: Send + Sync {
    /// Called once per line, without the trailing newline
    fn on_line(&self, stream: Stream, line: &str);
}

/// The last [`MAX_OUTPUT_LINES`] lines of a command's combined output
#[derive(Debug, Clone, Default)]
pub struct OutputTail {
    lines: VecDeque<String>,
    dropped: usize,
}

impl OutputTail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == MAX_OUTPUT_LINES {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(line);
    }

    /// Number of lines that fell off the front
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Join the kept lines, noting how many were dropped
    pub fn into_string(self) -> String {
        let mut out = String::new();
        if self.dropped > 0 {
            out.push_str(&format!("[... {} earlier lines omitted]\n", self.dropped));
        }
        let body: Vec<String> = self.lines.into_iter().collect();
        out.push_str(&body.join("\n"));
        out
    }
}
