//! Test: Disabled Deploy - a disabled deployment never runs

use crate::helpers::*;
use cimatrix::core::{ExecutionStatus, StepState};
use cimatrix::execution::ExecutionEvent;

#[tokio::test]
async fn test_disabled_deploy_never_runs_on_success() {
    let runner = MockRunner::new();
    let result = run_build(REFERENCE, runner.clone()).await;

    assert_eq!(result.verdict, ExecutionStatus::Passed);
    assert_eq!(runner.count(DEPLOY), 0);
    for job in &result.build.jobs {
        match result.step_state(job, "deploy.1") {
            StepState::Skipped { reason } => assert_eq!(reason, "deploy disabled"),
            other => panic!("expected skip, got {:?}", other),
        }
    }

    let never_started = result.events.iter().all(|event| {
        !matches!(event, ExecutionEvent::StepStarted { step_id, .. } if step_id == "deploy.1")
    });
    assert!(never_started);
}

#[tokio::test]
async fn test_disabled_deploy_never_runs_on_failure() {
    let runner = MockRunner::new().fail(TEST, 1);
    let result = run_build(REFERENCE, runner.clone()).await;

    assert_eq!(result.verdict, ExecutionStatus::Failed);
    assert_eq!(runner.count(DEPLOY), 0);
}

#[tokio::test]
async fn test_enabled_deploy_runs_after_success() {
    let yaml = REFERENCE.replace("deploy:\n  run:", "deploy:\n  enabled: true\n  run:");
    let runner = MockRunner::new().fail_when(TEST, 1, "TRAVIS_OS_NAME", "osx");
    let result = run_build(&yaml, runner.clone()).await;

    assert_eq!(runner.count(DEPLOY), 3);
    for job in &result.build.jobs {
        let deployed = runner.commands_for(job.number).contains(&DEPLOY.to_string());
        assert_eq!(deployed, job.os.as_str() == "linux");
    }
}

#[tokio::test]
async fn test_enabled_deploy_failure_errors_job() {
    let yaml = REFERENCE.replace("deploy:\n  run:", "deploy:\n  enabled: true\n  run:");
    let runner = MockRunner::new().fail(DEPLOY, 1);
    let result = run_build(&yaml, runner).await;

    assert_eq!(result.verdict, ExecutionStatus::Errored);
}
