//! Core domain models
//!
//! This module defines the fundamental data structures that represent
//! builds, jobs, steps, and their configuration.

pub mod build;
pub mod config;
pub mod env;
pub mod job;
pub mod matrix;
pub mod phase;
pub mod state;
pub mod step;

pub use build::*;
pub use config::{CiConfig, OperatingSystem};
pub use env::{EnvVar, JobEnvironment};
pub use job::*;
pub use matrix::{MatrixCell, MatrixExpander};
pub use phase::Phase;
pub use state::*;
pub use step::*;
