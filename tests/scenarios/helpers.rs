//! Test utilities for build scenarios

use async_trait::async_trait;
use cimatrix::core::{Build, BuildOptions, CiConfig, ExecutionStatus, Job, StepState};
use cimatrix::execution::{ExecutionEngine, ExecutionEvent, SchedulingStrategy};
use cimatrix::runner::{
    CommandInvocation, CommandOutput, CommandRunner, OutputSink, RunnerError, Stream,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Workflow modelled on a conda package's CI: bootstrap, install, test,
/// two analysis gates, lint, coverage upload, and a disabled deploy.
pub const REFERENCE: &str = r#"
name: conda
language: python
os:
  - linux
  - osx
python:
  - "2.7"
  - "3.4"
  - "3.5"
env:
  global:
    - PYTHONUNBUFFERED=1
    - secure: BINSTAR_TOKEN
    - PY_VERSION=$TRAVIS_PYTHON_VERSION
install:
  - ./ci/bootstrap.sh
  - pip install -e .
script:
  - py.test --cov conda tests
  - radon cc -nc conda
  - radon mi -nc conda
  - flake8 conda
after_success:
  - codecov --env PY_VERSION
deploy:
  run:
    - ./ci/upload.sh
"#;

pub const BOOTSTRAP: &str = "./ci/bootstrap.sh";
pub const INSTALL: &str = "pip install -e .";
pub const TEST: &str = "py.test --cov conda tests";
pub const COMPLEXITY: &str = "radon cc -nc conda";
pub const MAINTAINABILITY: &str = "radon mi -nc conda";
pub const LINT: &str = "flake8 conda";
pub const UPLOAD: &str = "codecov --env PY_VERSION";
pub const DEPLOY: &str = "./ci/upload.sh";

/// One command the mock runner was asked to run
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: String,
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn job_number(&self) -> usize {
        self.env
            .get("TRAVIS_JOB_NUMBER")
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }
}

/// A failure rule: the command fails with `code` in jobs matching `when`
struct Rule {
    command: String,
    code: i32,
    when: Option<(String, String)>,
}

#[derive(Default)]
struct MockState {
    rules: Vec<Rule>,
    output: HashMap<String, String>,
    invocations: Vec<Invocation>,
}

/// Command runner that succeeds unless told otherwise and records every call
#[derive(Clone, Default)]
pub struct MockRunner {
    state: Arc<Mutex<MockState>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `command` exit with `code` in every job
    pub fn fail(self, command: &str, code: i32) -> Self {
        self.state.lock().unwrap().rules.push(Rule {
            command: command.to_string(),
            code,
            when: None,
        });
        self
    }

    /// Make `command` exit with `code` in jobs where `var` equals `value`
    pub fn fail_when(self, command: &str, code: i32, var: &str, value: &str) -> Self {
        self.state.lock().unwrap().rules.push(Rule {
            command: command.to_string(),
            code,
            when: Some((var.to_string(), value.to_string())),
        });
        self
    }

    /// Make `command` print `text`, with `$NAME` replaced from the job env
    pub fn print(self, command: &str, text: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .output
            .insert(command.to_string(), text.to_string());
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().unwrap().invocations.clone()
    }

    /// Commands run by one job, in order
    pub fn commands_for(&self, job_number: usize) -> Vec<String> {
        self.invocations()
            .into_iter()
            .filter(|i| i.job_number() == job_number)
            .map(|i| i.command)
            .collect()
    }

    /// Number of times `command` ran across all jobs
    pub fn count(&self, command: &str) -> usize {
        self.invocations()
            .iter()
            .filter(|i| i.command == command)
            .count()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(
        &self,
        invocation: &CommandInvocation,
        sink: Option<&dyn OutputSink>,
    ) -> Result<CommandOutput, RunnerError> {
        let (code, text) = {
            let mut state = self.state.lock().unwrap();
            state.invocations.push(Invocation {
                command: invocation.command.clone(),
                env: invocation.env.clone(),
            });

            let code = state
                .rules
                .iter()
                .find(|rule| {
                    rule.command == invocation.command
                        && rule.when.as_ref().map_or(true, |(var, value)| {
                            invocation.env.get(var) == Some(value)
                        })
                })
                .map_or(0, |rule| rule.code);

            let text = state.output.get(&invocation.command).map(|text| {
                invocation
                    .env
                    .iter()
                    .fold(text.clone(), |acc, (name, value)| {
                        acc.replace(&format!("${}", name), value)
                    })
            });
            (code, text.unwrap_or_default())
        };

        if let Some(sink) = sink {
            for line in text.lines() {
                sink.on_line(Stream::Stdout, line);
            }
        }
        Ok(CommandOutput::new(Some(code), text))
    }
}

/// Result of running a build in a test
pub struct BuildTestResult {
    pub build: Build,
    pub verdict: ExecutionStatus,
    pub events: Vec<ExecutionEvent>,
}

impl BuildTestResult {
    pub fn job(&self, number: usize) -> &Job {
        self.build
            .job(number)
            .unwrap_or_else(|| panic!("job {} does not exist", number))
    }

    /// Job matching an OS name and interpreter version
    pub fn job_for(&self, os: &str, version: &str) -> &Job {
        self.build
            .jobs
            .iter()
            .find(|j| j.os.as_str() == os && j.interpreter_version.as_deref() == Some(version))
            .unwrap_or_else(|| panic!("no job for {} {}", os, version))
    }

    pub fn step_state<'a>(&'a self, job: &'a Job, step_id: &str) -> &'a StepState {
        &job.step(step_id)
            .unwrap_or_else(|| panic!("step {} does not exist", step_id))
            .state
    }

    /// Every streamed output line, in arrival order
    pub fn output_lines(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ExecutionEvent::StepOutput { line, .. } => Some(line.clone()),
                _ => None,
            })
            .collect()
    }
}

pub fn config(yaml: &str) -> CiConfig {
    CiConfig::from_yaml(yaml).unwrap_or_else(|e| panic!("invalid test config: {:#}", e))
}

/// Run a build on every OS with the mock runner
pub async fn run_build(yaml: &str, runner: MockRunner) -> BuildTestResult {
    run_build_with(yaml, runner, BuildOptions::default(), SchedulingStrategy::Parallel).await
}

pub async fn run_build_with(
    yaml: &str,
    runner: MockRunner,
    options: BuildOptions,
    strategy: SchedulingStrategy,
) -> BuildTestResult {
    let mut build = Build::from_config(&config(yaml), &options).expect("matrix expansion failed");

    let events = Arc::new(Mutex::new(Vec::new()));
    let captured = events.clone();

    let mut engine = ExecutionEngine::new(runner, strategy).with_host_os(None);
    engine.add_event_handler(move |event| captured.lock().unwrap().push(event));

    let verdict = engine.execute(&mut build).await.expect("build did not run");
    let events = events.lock().unwrap().clone();

    BuildTestResult {
        build,
        verdict,
        events,
    }
}

pub fn assert_skipped(state: &StepState) {
    assert!(
        matches!(state, StepState::Skipped { .. }),
        "expected step to be skipped, got {:?}",
        state
    );
}
