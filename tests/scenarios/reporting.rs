//! Test: Reporting - post-build steps run by verdict and never change it

use crate::helpers::*;
use cimatrix::core::{ExecutionStatus, StepState};

const WITH_CLEANUP: &str = r#"
language: python
os: [linux]
python: ["3.5"]
script:
  - pytest
after_success:
  - codecov
after_failure:
  - cat test.log
after_script:
  - rm -rf build
"#;

#[tokio::test]
async fn test_upload_runs_only_after_success() {
    let runner = MockRunner::new();
    let result = run_build(WITH_CLEANUP, runner.clone()).await;

    assert_eq!(result.verdict, ExecutionStatus::Passed);
    assert_eq!(runner.commands_for(1), vec!["pytest", "codecov", "rm -rf build"]);
    assert_skipped(result.step_state(result.job(1), "after_failure.1"));
}

#[tokio::test]
async fn test_failure_runs_after_failure_and_after_script() {
    let runner = MockRunner::new().fail("pytest", 1);
    let result = run_build(WITH_CLEANUP, runner.clone()).await;

    assert_eq!(result.verdict, ExecutionStatus::Failed);
    assert_eq!(runner.commands_for(1), vec!["pytest", "cat test.log", "rm -rf build"]);

    match result.step_state(result.job(1), "after_success.1") {
        StepState::Skipped { reason } => assert_eq!(reason, "job did not pass"),
        other => panic!("expected skip, got {:?}", other),
    }
}

#[tokio::test]
async fn test_upload_failure_is_not_fatal() {
    let runner = MockRunner::new().fail(UPLOAD, 1);
    let result = run_build(REFERENCE, runner.clone()).await;

    assert_eq!(result.verdict, ExecutionStatus::Passed);
    assert_eq!(runner.count(UPLOAD), 6);
    for job in &result.build.jobs {
        assert_eq!(job.status, ExecutionStatus::Passed);
        assert!(matches!(
            result.step_state(job, "after_success.1"),
            StepState::Failed { exit_code: Some(1), .. }
        ));
        assert!(job.failed_step().is_none());
    }
}

#[tokio::test]
async fn test_cleanup_failure_is_not_fatal() {
    let runner = MockRunner::new().fail("rm -rf build", 1);
    let result = run_build(WITH_CLEANUP, runner).await;
    assert_eq!(result.verdict, ExecutionStatus::Passed);
}
