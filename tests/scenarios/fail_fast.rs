//! Test: Fail Fast - a failing gate stops the job and decides its status

use crate::helpers::*;
use cimatrix::core::{ExecutionStatus, StepState};

#[tokio::test]
async fn test_failing_test_stops_job() {
    let runner = MockRunner::new().fail_when(TEST, 1, "TRAVIS_PYTHON_VERSION", "3.4");
    let result = run_build(REFERENCE, runner.clone()).await;

    assert_eq!(result.verdict, ExecutionStatus::Failed);

    for os in ["linux", "osx"] {
        let job = result.job_for(os, "3.4");
        assert_eq!(job.status, ExecutionStatus::Failed);
        assert_eq!(runner.commands_for(job.number), vec![BOOTSTRAP, INSTALL, TEST]);
        assert_skipped(result.step_state(job, "script.2"));
        assert_skipped(result.step_state(job, "script.4"));
        assert_skipped(result.step_state(job, "after_success.1"));
        assert_eq!(job.failed_step().map(|s| s.id.as_str()), Some("script.1"));
    }

    // The other versions are unaffected
    assert_eq!(result.build.jobs_with_status(ExecutionStatus::Passed).len(), 4);
}

#[tokio::test]
async fn test_failing_analysis_blocks_lint_and_upload() {
    let runner = MockRunner::new().fail(MAINTAINABILITY, 2);
    let result = run_build(REFERENCE, runner.clone()).await;

    assert_eq!(result.verdict, ExecutionStatus::Failed);
    assert_eq!(runner.count(LINT), 0);
    assert_eq!(runner.count(UPLOAD), 0);

    let job = result.job(1);
    match result.step_state(job, "script.3") {
        StepState::Failed { exit_code, error, .. } => {
            assert_eq!(*exit_code, Some(2));
            assert_eq!(error, "exited with code 2");
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_install_failure_errors_job() {
    let runner = MockRunner::new().fail_when(BOOTSTRAP, 1, "TRAVIS_OS_NAME", "osx");
    let result = run_build(REFERENCE, runner.clone()).await;

    assert_eq!(result.verdict, ExecutionStatus::Errored);
    assert_eq!(result.build.jobs_with_status(ExecutionStatus::Errored).len(), 3);
    assert_eq!(result.build.jobs_with_status(ExecutionStatus::Passed).len(), 3);

    let job = result.job_for("osx", "2.7");
    assert_eq!(runner.commands_for(job.number), vec![BOOTSTRAP]);
    assert_skipped(result.step_state(job, "install.2"));
    assert_skipped(result.step_state(job, "script.1"));
}

#[tokio::test]
async fn test_errored_beats_failed() {
    let runner = MockRunner::new()
        .fail_when(INSTALL, 1, "TRAVIS_PYTHON_VERSION", "2.7")
        .fail_when(LINT, 1, "TRAVIS_PYTHON_VERSION", "3.5");
    let result = run_build(REFERENCE, runner).await;

    assert_eq!(result.verdict, ExecutionStatus::Errored);
    assert_eq!(result.job_for("linux", "3.5").status, ExecutionStatus::Failed);
    assert_eq!(result.job_for("linux", "3.4").status, ExecutionStatus::Passed);
}
