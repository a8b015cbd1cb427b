//! Dependency barriers, concurrency limits and at-most-once execution

use crate::helpers::*;
use gantry::core::{ExecutionStatus, JobOutcome, RepositoryEvent};
use gantry::execution::{ExecutionEvent, SchedulingStrategy};
use std::collections::HashMap;

const DIAMOND: &str = r#"
on: push
jobs:
  checkout:
    steps:
      - run: sleep 30
  lint:
    needs: checkout
    steps:
      - run: sleep 60
  test:
    needs: checkout
    steps:
      - run: sleep 60
  package:
    needs: [lint, test]
    steps:
      - run: echo packaging
"#;

const INDEPENDENT: &str = r#"
on: push
jobs:
  a:
    steps: [ { run: sleep 80 } ]
  b:
    steps: [ { run: sleep 80 } ]
  c:
    steps: [ { run: sleep 80 } ]
  d:
    steps: [ { run: sleep 80 } ]
"#;

/// Dependents never start before their dependencies finish
#[tokio::test]
async fn test_diamond_respects_barriers() {
    let harness = Harness::new(&[]).with_strategy(SchedulingStrategy::Parallel);
    let report = harness.run(DIAMOND, RepositoryEvent::push("main")).await;

    assert_eq!(report.status, ExecutionStatus::Succeeded);
    assert_eq!(report.count(JobOutcome::Succeeded), 4);

    let timeline = harness.scripted.timeline();
    assert_finished_before(&timeline, "checkout", "lint");
    assert_finished_before(&timeline, "checkout", "test");
    assert_finished_before(&timeline, "lint", "package");
    assert_finished_before(&timeline, "test", "package");
}

/// Every job starts once and reports once per run
#[tokio::test]
async fn test_each_job_runs_once() {
    let harness = Harness::new(&[]);
    harness.run(DIAMOND, RepositoryEvent::push("main")).await;

    let mut started: HashMap<String, usize> = HashMap::new();
    for event in harness.events() {
        if let ExecutionEvent::JobStarted { job } = event {
            *started.entry(job).or_default() += 1;
        }
    }
    assert_eq!(started.len(), 4);
    assert!(started.values().all(|n| *n == 1), "{:?}", started);

    let records = harness.memory.records().await;
    assert_eq!(records.len(), 4);
    for job in ["checkout", "lint", "test", "package"] {
        assert_eq!(harness.scripted.calls_for(job).len(), 1);
        assert_eq!(records.iter().filter(|r| r.job == job).count(), 1);
    }
}

/// Independent jobs overlap under the parallel strategy
#[tokio::test]
async fn test_parallel_jobs_overlap() {
    let harness = Harness::new(&[]).with_strategy(SchedulingStrategy::Parallel);
    harness.run(INDEPENDENT, RepositoryEvent::push("main")).await;
    assert!(harness.scripted.max_in_flight() > 1);
}

#[tokio::test]
async fn test_sequential_runs_one_job_at_a_time() {
    let harness = Harness::new(&[]).with_strategy(SchedulingStrategy::Sequential);
    let report = harness.run(INDEPENDENT, RepositoryEvent::push("main")).await;
    assert_eq!(report.count(JobOutcome::Succeeded), 4);
    assert_eq!(harness.scripted.max_in_flight(), 1);
}

#[tokio::test]
async fn test_limited_parallel_caps_jobs() {
    let harness = Harness::new(&[]).with_strategy(SchedulingStrategy::LimitedParallel(2));
    let report = harness.run(INDEPENDENT, RepositoryEvent::push("main")).await;
    assert_eq!(report.count(JobOutcome::Succeeded), 4);
    assert!(harness.scripted.max_in_flight() <= 2);
}

/// A failure skips the whole downstream chain but not unrelated jobs
#[tokio::test]
async fn test_failure_skips_transitive_dependents() {
    let yaml = r#"
on: push
jobs:
  build:
    steps: [ { run: exit 2 } ]
  test:
    needs: build
    steps: [ { run: echo test } ]
  deploy:
    needs: test
    steps: [ { run: echo deploy } ]
  docs:
    steps: [ { run: echo docs } ]
"#;
    let harness = Harness::new(&[]);
    let report = harness.run(yaml, RepositoryEvent::push("main")).await;

    assert_eq!(report.outcome("build"), Some(JobOutcome::Failed));
    assert_eq!(report.outcome("test"), Some(JobOutcome::Skipped));
    assert_eq!(report.outcome("deploy"), Some(JobOutcome::Skipped));
    assert_eq!(report.outcome("docs"), Some(JobOutcome::Succeeded));
    assert!(harness.scripted.calls_for("test").is_empty());
    assert!(harness.scripted.calls_for("deploy").is_empty());

    // Reports keep declaration order
    let names: Vec<&str> = report.jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["build", "test", "deploy", "docs"]);
}

/// Steps of a job stop at the first failure
#[tokio::test]
async fn test_job_stops_at_failed_step() {
    let yaml = r#"
on: push
jobs:
  build:
    steps:
      - run: echo one
      - run: exit 1
      - run: echo three
"#;
    let harness = Harness::new(&[]);
    let report = harness.run(yaml, RepositoryEvent::push("main")).await;
    assert_eq!(report.outcome("build"), Some(JobOutcome::Failed));
    let commands: Vec<String> = harness
        .scripted
        .calls_for("build")
        .into_iter()
        .map(|c| c.command)
        .collect();
    assert_eq!(commands, vec!["echo one", "exit 1"]);
}

/// A step that outlives its timeout fails the job
#[tokio::test]
async fn test_step_timeout_fails_job() {
    let yaml = r#"
on: push
jobs:
  slow:
    steps: [ { run: sleep 2000 } ]
  after:
    needs: slow
    steps: [ { run: echo after } ]
"#;
    let harness = Harness::new(&[]).with_default_timeout(std::time::Duration::from_millis(50));
    let report = harness.run(yaml, RepositoryEvent::push("main")).await;
    assert_eq!(report.outcome("slow"), Some(JobOutcome::Failed));
    assert!(report
        .job("slow")
        .unwrap()
        .reason
        .as_deref()
        .unwrap()
        .contains("timed out"));
    assert_eq!(report.outcome("after"), Some(JobOutcome::Skipped));
}
