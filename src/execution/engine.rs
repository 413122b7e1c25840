//! Main execution engine - orchestrates the whole build

use crate::{
    core::{Build, ExecutionStatus, Job, OperatingSystem},
    execution::{ExecutionScheduler, JobExecutor, SchedulingStrategy, Workspace},
    runner::{CommandRunner, Stream},
};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during a build
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    BuildStarted {
        execution_id: Uuid,
        build_name: String,
        total_jobs: usize,
    },
    JobStarted {
        job_number: usize,
        job_name: String,
    },
    JobSkipped {
        job_number: usize,
        job_name: String,
        reason: String,
    },
    StepStarted {
        job_number: usize,
        step_id: String,
        command: String,
    },
    StepOutput {
        job_number: usize,
        step_id: String,
        stream: Stream,
        line: String,
    },
    StepFinished {
        job_number: usize,
        step_id: String,
        exit_code: Option<i32>,
        error: Option<String>,
    },
    StepSkipped {
        job_number: usize,
        step_id: String,
        reason: String,
    },
    JobFinished {
        job_number: usize,
        job_name: String,
        status: ExecutionStatus,
    },
    BuildFinished {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fans events out to every registered handler
#[derive(Clone, Default)]
pub struct EventEmitter {
    handlers: Arc<Vec<EventHandler>>,
}

impl EventEmitter {
    pub fn new(handlers: Vec<EventHandler>) -> Self {
        Self {
            handlers: Arc::new(handlers),
        }
    }

    /// Emit an event to all handlers
    pub fn emit(&self, event: ExecutionEvent) {
        for handler in self.handlers.iter() {
            handler(event.clone());
        }
    }
}

/// Main build execution engine
pub struct ExecutionEngine<R> {
    runner: Arc<R>,
    scheduler: ExecutionScheduler,
    workspace: Arc<Workspace>,
    event_handlers: Vec<EventHandler>,
}

impl<R: CommandRunner + 'static> ExecutionEngine<R> {
    /// Create an engine that only runs jobs for the current host OS
    pub fn new(runner: R, strategy: SchedulingStrategy) -> Self {
        Self {
            runner: Arc::new(runner),
            scheduler: ExecutionScheduler::for_host(strategy, std::env::consts::OS),
            workspace: Arc::new(Workspace::Shared),
            event_handlers: Vec::new(),
        }
    }

    /// Choose where jobs run; the default shares the runner's workdir
    pub fn with_workspace(mut self, workspace: Workspace) -> Self {
        self.workspace = Arc::new(workspace);
        self
    }

    /// Restrict jobs to `host_os`, or run every job with `None`
    pub fn with_host_os(mut self, host_os: Option<OperatingSystem>) -> Self {
        self.scheduler = ExecutionScheduler::new(self.scheduler.strategy(), host_os);
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    /// Execute every job of the build and return its verdict
    pub async fn execute(&self, build: &mut Build) -> Result<ExecutionStatus> {
        let execution_id = build.state.execution_id;
        let emitter = EventEmitter::new(self.event_handlers.clone());

        info!(
            "Starting build {} ({}) with {} job(s)",
            build.name,
            execution_id,
            build.jobs.len()
        );
        emitter.emit(ExecutionEvent::BuildStarted {
            execution_id,
            build_name: build.name.clone(),
            total_jobs: build.jobs.len(),
        });
        build.state.start(build.jobs.len());

        let (runnable, skipped) = self.scheduler.plan(build);

        for (index, reason) in skipped {
            let job = &mut build.jobs[index];
            info!("Skipping job {}: {}", job.name(), reason);
            job.skip(&reason);
            emitter.emit(ExecutionEvent::JobSkipped {
                job_number: job.number,
                job_name: job.name(),
                reason,
            });
        }

        let executor = Arc::new(JobExecutor::new(
            self.runner.clone(),
            emitter.clone(),
            build.step_timeout_secs,
        ));
        let concurrency = self.scheduler.concurrency(runnable.len());

        if concurrency == 1 {
            for index in runnable {
                run_job(&executor, &self.workspace, &mut build.jobs[index]).await;
            }
        } else {
            self.execute_concurrently(build, runnable, executor, concurrency)
                .await?;
        }

        build.state.finished_jobs = build
            .jobs
            .iter()
            .filter(|j| j.status.is_terminal())
            .count();

        let verdict = build.verdict();
        build.state.finish(verdict);

        match verdict {
            ExecutionStatus::Passed | ExecutionStatus::Skipped => {
                info!("Build {} finished: {}", build.name, verdict)
            }
            _ => warn!("Build {} finished: {}", build.name, verdict),
        }
        emitter.emit(ExecutionEvent::BuildFinished {
            execution_id,
            status: verdict,
        });

        Ok(verdict)
    }

    async fn execute_concurrently(
        &self,
        build: &mut Build,
        runnable: Vec<usize>,
        executor: Arc<JobExecutor<R>>,
        concurrency: usize,
    ) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut tasks: JoinSet<(usize, Job)> = JoinSet::new();

        for index in runnable {
            let mut job = build.jobs[index].clone();
            let executor = executor.clone();
            let workspace = self.workspace.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                run_job(&executor, &workspace, &mut job).await;
                (index, job)
            });
        }

        let mut failures = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, job)) => build.jobs[index] = job,
                Err(e) => {
                    error!("Job task failed: {}", e);
                    failures += 1;
                }
            }
        }

        if failures > 0 {
            return Err(anyhow!("{} job task(s) did not complete", failures));
        }
        Ok(())
    }
}

/// Prepare the job's directory, then run it there
async fn run_job<R: CommandRunner>(
    executor: &JobExecutor<R>,
    workspace: &Workspace,
    job: &mut Job,
) -> ExecutionStatus {
    match workspace.prepare(job.number).await {
        Ok(scratch) => {
            executor
                .execute(job, scratch.as_ref().map(|s| s.path()))
                .await
        }
        Err(e) => executor.abort(job, &format!("workspace setup failed: {:#}", e)),
    }
}
