//! Test: Environment - global, matrix and override variables reach every command

use crate::helpers::*;
use cimatrix::core::{BuildOptions, ExecutionStatus};
use cimatrix::execution::SchedulingStrategy;
use std::collections::HashMap;

fn with_token() -> BuildOptions {
    let mut secrets = HashMap::new();
    secrets.insert("BINSTAR_TOKEN".to_string(), "s3cr3t-t0ken".to_string());
    BuildOptions {
        secrets,
        ..BuildOptions::default()
    }
}

#[tokio::test]
async fn test_global_env_visible_in_every_command() {
    let runner = MockRunner::new();
    run_build_with(REFERENCE, runner.clone(), with_token(), SchedulingStrategy::Parallel).await;

    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 6 * 7);
    for invocation in &invocations {
        let env = &invocation.env;
        assert_eq!(env.get("PYTHONUNBUFFERED").map(String::as_str), Some("1"));
        assert_eq!(env.get("BINSTAR_TOKEN").map(String::as_str), Some("s3cr3t-t0ken"));
        assert_eq!(env.get("PY_VERSION"), env.get("TRAVIS_PYTHON_VERSION"));
        assert_eq!(env.get("CI").map(String::as_str), Some("true"));
    }
}

#[tokio::test]
async fn test_secure_value_is_masked_in_output() {
    let runner = MockRunner::new()
        .print(UPLOAD, "uploading for $PY_VERSION with $BINSTAR_TOKEN")
        .print(DEPLOY, "$BINSTAR_TOKEN");
    let result =
        run_build_with(REFERENCE, runner, with_token(), SchedulingStrategy::Parallel).await;

    let lines = result.output_lines();
    assert_eq!(lines.len(), 6);
    for line in &lines {
        assert!(!line.contains("s3cr3t-t0ken"), "secret leaked: {}", line);
        assert!(line.ends_with("with [secure]"));
    }

    for job in &result.build.jobs {
        let output = job.step("after_success.1").unwrap().state.output().unwrap_or_default();
        assert!(output.contains("[secure]"));
        assert!(!output.contains("s3cr3t-t0ken"));
    }
}

#[tokio::test]
async fn test_missing_secret_still_runs() {
    let runner = MockRunner::new();
    let result = run_build(REFERENCE, runner.clone()).await;

    assert_eq!(result.verdict, ExecutionStatus::Passed);
    assert!(runner
        .invocations()
        .iter()
        .all(|i| !i.env.contains_key("BINSTAR_TOKEN")));
}

#[tokio::test]
async fn test_matrix_rows_and_overrides() {
    let yaml = r#"
os: [linux]
env:
  global:
    - MODE=default
    - LABEL="$MODE run"
  matrix:
    - MODE=fast
    - MODE=slow EXTRA=1
script:
  - make check
"#;
    let runner = MockRunner::new();
    let options = BuildOptions {
        overrides: vec![("EXTRA".to_string(), "forced".to_string())],
        ..BuildOptions::default()
    };
    let result = run_build_with(yaml, runner.clone(), options, SchedulingStrategy::Sequential).await;

    assert_eq!(result.build.jobs.len(), 2);
    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 2);

    let first = &invocations[0].env;
    assert_eq!(first.get("MODE").map(String::as_str), Some("fast"));
    assert_eq!(first.get("LABEL").map(String::as_str), Some("default run"));
    assert_eq!(first.get("EXTRA").map(String::as_str), Some("forced"));

    let second = &invocations[1].env;
    assert_eq!(second.get("MODE").map(String::as_str), Some("slow"));
    assert_eq!(second.get("EXTRA").map(String::as_str), Some("forced"));
}
