//! Job executor - runs the steps of a single job in order

use crate::{
    core::{ExecutionStatus, Job, Phase, StepState},
    execution::engine::{EventEmitter, ExecutionEvent},
    runner::{CommandInvocation, CommandRunner, OutputSink, Stream},
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Forwards a step's output lines as events, with secrets masked
struct StepSink<'a> {
    job_number: usize,
    step_id: &'a str,
    secrets: &'a [String],
    emitter: &'a EventEmitter,
}

impl OutputSink for StepSink<'_> {
    fn on_line(&self, stream: Stream, line: &str) {
        let mut line = line.to_string();
        for secret in self.secrets {
            line = line.replace(secret.as_str(), crate::core::env::MASK);
        }
        self.emitter.emit(ExecutionEvent::StepOutput {
            job_number: self.job_number,
            step_id: self.step_id.to_string(),
            stream,
            line,
        });
    }
}

/// Executes a single job
pub struct JobExecutor<R> {
    runner: Arc<R>,
    emitter: EventEmitter,
    timeout_secs: u64,
}

impl<R: CommandRunner> JobExecutor<R> {
    pub fn new(runner: Arc<R>, emitter: EventEmitter, timeout_secs: u64) -> Self {
        Self {
            runner,
            emitter,
            timeout_secs,
        }
    }

    /// Run every step of the job and return its final status.
    ///
    /// Gating steps stop the job at the first failure; reporting steps run
    /// according to the verdict and never change it. `workdir` overrides the
    /// runner's working directory for every step.
    pub async fn execute(&self, job: &mut Job, workdir: Option<&Path>) -> ExecutionStatus {
        let job_name = job.name();
        info!("Starting job {}", job_name);

        job.status = ExecutionStatus::Running;
        job.started_at = Some(Utc::now());
        self.emitter.emit(ExecutionEvent::JobStarted {
            job_number: job.number,
            job_name: job_name.clone(),
        });

        let env = job.env.resolved();
        let secrets: Vec<String> = job.env.secret_values().into_iter().map(str::to_string).collect();
        let mut verdict = ExecutionStatus::Passed;

        for index in 0..job.steps.len() {
            let phase = job.steps[index].phase;

            let skip_reason = if job.steps[index].disabled {
                Some(if phase == Phase::Deploy {
                    "deploy disabled"
                } else {
                    "step disabled"
                })
            } else {
                phase.skip_reason(verdict)
            };

            if let Some(reason) = skip_reason {
                let step = &mut job.steps[index];
                debug!("Skipping {} in job {}: {}", step.id, job.number, reason);
                step.state = StepState::Skipped {
                    reason: reason.to_string(),
                };
                self.emitter.emit(ExecutionEvent::StepSkipped {
                    job_number: job.number,
                    step_id: step.id.clone(),
                    reason: reason.to_string(),
                });
                continue;
            }

            let state = self.run_step(job, index, &env, &secrets, workdir).await;
            let failed = matches!(state, StepState::Failed { .. });
            job.steps[index].state = state;

            if failed {
                match phase.failure_status() {
                    Some(status) => {
                        warn!(
                            "Job {} {}: step {} failed",
                            job.number,
                            status,
                            job.steps[index].id
                        );
                        verdict = status;
                    }
                    None => warn!(
                        "Job {}: {} step {} failed, verdict unchanged",
                        job.number, phase, job.steps[index].id
                    ),
                }
            }
        }

        job.status = verdict;
        job.finished_at = Some(Utc::now());
        info!("Job {} finished: {}", job_name, verdict);
        self.emitter.emit(ExecutionEvent::JobFinished {
            job_number: job.number,
            job_name,
            status: verdict,
        });

        verdict
    }

    /// Record a job that could not be started as Errored
    pub fn abort(&self, job: &mut Job, reason: &str) -> ExecutionStatus {
        let job_name = job.name();
        error!("Job {} could not start: {}", job_name, reason);
        job.abort(reason);
        self.emitter.emit(ExecutionEvent::JobFinished {
            job_number: job.number,
            job_name,
            status: job.status,
        });
        job.status
    }

    async fn run_step(
        &self,
        job: &mut Job,
        index: usize,
        env: &BTreeMap<String, String>,
        secrets: &[String],
        workdir: Option<&Path>,
    ) -> StepState {
        let started_at = Utc::now();
        let (step_id, command) = {
            let step = &mut job.steps[index];
            step.state = StepState::Running { started_at };
            (step.id.clone(), step.command.clone())
        };

        self.emitter.emit(ExecutionEvent::StepStarted {
            job_number: job.number,
            step_id: step_id.clone(),
            command: job.env.mask(&command),
        });

        let invocation = CommandInvocation {
            command,
            env: env.clone(),
            timeout_secs: self.timeout_secs,
            workdir: workdir.map(Path::to_path_buf),
        };
        let sink = StepSink {
            job_number: job.number,
            step_id: &step_id,
            secrets,
            emitter: &self.emitter,
        };

        let result = self.runner.run(&invocation, Some(&sink)).await;
        let finished_at = Utc::now();

        let state = match result {
            Ok(output) if output.success() => StepState::Passed {
                output: job.env.mask(&output.output),
                started_at,
                finished_at,
            },
            Ok(output) => {
                let error = match output.exit_code {
                    Some(code) => format!("exited with code {}", code),
                    None => "terminated by signal".to_string(),
                };
                StepState::Failed {
                    exit_code: output.exit_code,
                    error,
                    output: job.env.mask(&output.output),
                    started_at,
                    finished_at,
                }
            }
            Err(e) => StepState::Failed {
                exit_code: None,
                error: e.to_string(),
                output: String::new(),
                started_at,
                finished_at,
            },
        };

        let (exit_code, error) = match &state {
            StepState::Failed { exit_code, error, .. } => (*exit_code, Some(error.clone())),
            _ => (Some(0), None),
        };
        self.emitter.emit(ExecutionEvent::StepFinished {
            job_number: job.number,
            step_id,
            exit_code,
            error,
        });

        state
    }
}
