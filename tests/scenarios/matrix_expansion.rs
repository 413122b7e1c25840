//! Test: Matrix Expansion - every OS/version pair runs once, in lifecycle order

use crate::helpers::*;
use cimatrix::core::{BuildOptions, ExecutionStatus};
use cimatrix::execution::SchedulingStrategy;
use regex::Regex;
use std::collections::HashSet;

#[tokio::test]
async fn test_six_jobs_each_pair_once() {
    let runner = MockRunner::new();
    let result = run_build(REFERENCE, runner.clone()).await;

    assert_eq!(result.build.jobs.len(), 6);
    assert_eq!(result.verdict, ExecutionStatus::Passed);

    let mut seen = HashSet::new();
    for job in &result.build.jobs {
        let pair = (job.os.as_str(), job.interpreter_version.clone().unwrap());
        assert!(seen.insert(pair), "duplicate job {}", job.name());
    }
    for os in ["linux", "osx"] {
        for version in ["2.7", "3.4", "3.5"] {
            assert!(seen.contains(&(os, version.to_string())));
        }
    }

    // The bootstrap script ran exactly once per job
    assert_eq!(runner.count(BOOTSTRAP), 6);
}

#[tokio::test]
async fn test_steps_run_in_lifecycle_order() {
    let runner = MockRunner::new();
    let result = run_build(REFERENCE, runner.clone()).await;

    for job in &result.build.jobs {
        assert_eq!(
            runner.commands_for(job.number),
            vec![BOOTSTRAP, INSTALL, TEST, COMPLEXITY, MAINTAINABILITY, LINT, UPLOAD],
            "wrong order in {}",
            job.name()
        );
        assert_eq!(job.status, ExecutionStatus::Passed);
    }
}

#[tokio::test]
async fn test_sequential_strategy_runs_jobs_in_matrix_order() {
    let runner = MockRunner::new();
    run_build_with(
        REFERENCE,
        runner.clone(),
        BuildOptions::default(),
        SchedulingStrategy::Sequential,
    )
    .await;

    let mut order: Vec<usize> = runner
        .invocations()
        .iter()
        .map(|i| i.job_number())
        .collect();
    order.dedup();
    assert_eq!(order, vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn test_only_filter_limits_jobs() {
    let runner = MockRunner::new();
    let options = BuildOptions {
        only: Some(Regex::new("osx .* 3\\.5").unwrap()),
        ..BuildOptions::default()
    };
    let result = run_build_with(REFERENCE, runner.clone(), options, SchedulingStrategy::Parallel).await;

    assert_eq!(result.build.jobs.len(), 1);
    let job = &result.build.jobs[0];
    assert_eq!(job.os.as_str(), "osx");
    assert_eq!(job.interpreter_version.as_deref(), Some("3.5"));
    assert_eq!(runner.count(TEST), 1);
}

#[tokio::test]
async fn test_limited_parallel_finishes_every_job() {
    let runner = MockRunner::new();
    let result = run_build_with(
        REFERENCE,
        runner.clone(),
        BuildOptions::default(),
        SchedulingStrategy::LimitedParallel(2),
    )
    .await;

    assert_eq!(result.build.state.finished_jobs, 6);
    assert!(result.build.is_complete());
    assert_eq!(runner.count(LINT), 6);
}
