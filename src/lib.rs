//! cimatrix - run a Travis-style CI build matrix locally

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod runner;

// Re-export commonly used types
pub use core::{Build, BuildOptions, CiConfig, ExecutionStatus, Job, Phase, Step, StepState};
pub use execution::{ExecutionEngine, ExecutionEvent, SchedulingStrategy};
pub use runner::{CommandRunner, RunnerConfig, ShellRunner};
