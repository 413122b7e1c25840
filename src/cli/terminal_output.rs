//! Terminal printer for streamed step output
//!
//! `TerminalOutput` turns execution events into lines on the terminal while
//! a build runs. Every output line is prefixed with its job number so that
//! interleaved output from parallel jobs stays readable:
//!
//! ```text
//! [#2] $ conda build conda.recipe
//! [#2] BUILD START: pkg-0.1-py35_0
//! [#5] $ flake8 .
//! ```
//!
//! # Example
//!
//! ```no_run
//! use cimatrix::cli::terminal_output::TerminalOutput;
//! use cimatrix::execution::ExecutionEvent;
//!
//! let printer = TerminalOutput::new(true);
//! printer.on_event(&ExecutionEvent::JobStarted {
//!     job_number: 1,
//!     job_name: "#1 linux python 3.5".to_string(),
//! });
//! ```

use crate::execution::ExecutionEvent;
use crate::runner::Stream;
use console::style;
use std::io::{self, Write};
use std::sync::Mutex;

/// Prints step commands and output lines as they arrive
#[derive(Debug)]
pub struct TerminalOutput {
    /// Print a separator when a job starts (sequential runs)
    separate_jobs: bool,
    /// Serializes writes from concurrent jobs
    lock: Mutex<()>,
}

impl TerminalOutput {
    pub fn new(separate_jobs: bool) -> Self {
        Self {
            separate_jobs,
            lock: Mutex::new(()),
        }
    }

    /// Prefix identifying the job a line belongs to
    pub fn prefix(job_number: usize) -> String {
        format!("[#{}]", job_number)
    }

    /// Render a line the way it is printed
    pub fn render(job_number: usize, stream: Stream, line: &str) -> String {
        let prefix = style(Self::prefix(job_number)).dim();
        match stream {
            Stream::Stdout => format!("{} {}", prefix, line),
            Stream::Stderr => format!("{} {}", prefix, style(line).yellow()),
        }
    }

    /// A horizontal rule spanning the terminal width
    fn separator() -> String {
        let width = term_size::dimensions_stdout()
            .map(|(w, _)| w)
            .unwrap_or(80);
        "─".repeat(width)
    }

    fn print(&self, text: &str) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{}", text);
        let _ = stdout.flush();
    }

    /// Handle one execution event
    pub fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::JobStarted { job_name, .. } if self.separate_jobs => {
                self.print(&format!("{}\n{}", Self::separator(), style(job_name).bold()));
            }
            ExecutionEvent::StepStarted {
                job_number,
                command,
                ..
            } => {
                self.print(&format!(
                    "{} {}",
                    style(Self::prefix(*job_number)).dim(),
                    style(format!("$ {}", command)).cyan()
                ));
            }
            ExecutionEvent::StepOutput {
                job_number,
                stream,
                line,
                ..
            } => self.print(&Self::render(*job_number, *stream, line)),
            _ => {}
        }
    }
}
