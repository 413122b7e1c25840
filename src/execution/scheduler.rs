//! Execution scheduler - decides which jobs run and how many at once

use crate::core::{Build, Job, OperatingSystem};
use tracing::warn;

/// Strategy for scheduling job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStrategy {
    /// Execute jobs in matrix order, one at a time
    Sequential,

    /// Execute all jobs at once
    Parallel,

    /// Limited parallelism (max N concurrent jobs)
    LimitedParallel(usize),
}

impl Default for SchedulingStrategy {
    fn default() -> Self {
        SchedulingStrategy::Parallel
    }
}

/// Which jobs the host can run
#[derive(Debug, Clone, PartialEq, Eq)]
enum HostFilter {
    Any,
    Only(OperatingSystem),
    Unsupported(String),
}

/// Scheduler for determining which jobs to run
#[derive(Debug, Clone)]
pub struct ExecutionScheduler {
    strategy: SchedulingStrategy,
    host: HostFilter,
}

impl ExecutionScheduler {
    /// Create a scheduler that only runs jobs for `host_os`.
    /// `None` runs every job regardless of its OS.
    pub fn new(strategy: SchedulingStrategy, host_os: Option<OperatingSystem>) -> Self {
        let host = match host_os {
            Some(os) => HostFilter::Only(os),
            None => HostFilter::Any,
        };
        Self { strategy, host }
    }

    /// Create a scheduler for a host named like `std::env::consts::OS`.
    ///
    /// A host that is neither linux nor macos runs no job.
    pub fn for_host(strategy: SchedulingStrategy, host_name: &str) -> Self {
        let host = match OperatingSystem::from_host_name(host_name) {
            Some(os) => HostFilter::Only(os),
            None => {
                warn!(
                    "Host {} matches no job OS, every job will be skipped (use --all-os to run them anyway)",
                    host_name
                );
                HostFilter::Unsupported(host_name.to_string())
            }
        };
        Self { strategy, host }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Number of jobs allowed to run concurrently for `pending` runnable jobs
    pub fn concurrency(&self, pending: usize) -> usize {
        let limit = match self.strategy {
            SchedulingStrategy::Sequential => 1,
            SchedulingStrategy::Parallel => pending,
            SchedulingStrategy::LimitedParallel(max) => max.min(pending),
        };
        limit.max(1)
    }

    /// Why a job can't run on this host, if it can't
    pub fn skip_reason(&self, job: &Job) -> Option<String> {
        match &self.host {
            HostFilter::Only(host) if *host != job.os => {
                Some(format!("requires {}, host is {}", job.os, host))
            }
            HostFilter::Unsupported(name) => {
                Some(format!("requires {}, host {} is not supported", job.os, name))
            }
            _ => None,
        }
    }

    /// Split the build's jobs into runnable indices and skipped ones with reasons
    pub fn plan(&self, build: &Build) -> (Vec<usize>, Vec<(usize, String)>) {
        let mut runnable = Vec::new();
        let mut skipped = Vec::new();
        for (index, job) in build.jobs.iter().enumerate() {
            match self.skip_reason(job) {
                Some(reason) => skipped.push((index, reason)),
                None => runnable.push(index),
            }
        }
        (runnable, skipped)
    }
}
