//! Override conditions and continue-on-error

use crate::helpers::*;
use gantry::core::{ExecutionStatus, JobOutcome, RepositoryEvent};

const WITH_CLEANUP: &str = r#"
on: push
jobs:
  build:
    steps: [ { run: exit 1 } ]
  cleanup:
    needs: build
    if: always()
    steps: [ { run: echo cleaning } ]
  notify:
    needs: build
    if: failure()
    steps: [ { run: echo notifying } ]
  celebrate:
    needs: build
    if: success()
    steps: [ { run: echo party } ]
  report:
    needs: build
    if: needs.build.result == 'failure'
    steps: [ { run: echo report } ]
"#;

#[tokio::test]
async fn test_overrides_after_failure() {
    let harness = Harness::new(&[]);
    let report = harness.run(WITH_CLEANUP, RepositoryEvent::push("main")).await;

    assert_eq!(report.outcome("build"), Some(JobOutcome::Failed));
    assert_eq!(report.outcome("cleanup"), Some(JobOutcome::Succeeded));
    assert_eq!(report.outcome("notify"), Some(JobOutcome::Succeeded));
    assert_eq!(report.outcome("celebrate"), Some(JobOutcome::Skipped));
    // No status function: the implicit success() gate still applies
    assert_eq!(report.outcome("report"), Some(JobOutcome::Skipped));
    assert_eq!(report.status, ExecutionStatus::Failed);

    assert_finished_before(&harness.scripted.timeline(), "build", "cleanup");
}

#[tokio::test]
async fn test_overrides_after_success() {
    let yaml = WITH_CLEANUP.replace("run: exit 1", "run: echo ok");
    let harness = Harness::new(&[]);
    let report = harness.run(&yaml, RepositoryEvent::push("main")).await;

    assert_eq!(report.outcome("cleanup"), Some(JobOutcome::Succeeded));
    assert_eq!(report.outcome("notify"), Some(JobOutcome::Skipped));
    assert_eq!(report.outcome("celebrate"), Some(JobOutcome::Succeeded));
    assert_eq!(report.outcome("report"), Some(JobOutcome::Skipped));
    assert_eq!(report.status, ExecutionStatus::Succeeded);
}

/// A failing override job does not fail the run
#[tokio::test]
async fn test_failed_override_job_is_not_required() {
    let yaml = r#"
on: push
jobs:
  build:
    steps: [ { run: echo ok } ]
  cleanup:
    needs: build
    if: always()
    steps: [ { run: exit 1 } ]
"#;
    let harness = Harness::new(&[]);
    let report = harness.run(yaml, RepositoryEvent::push("main")).await;
    assert_eq!(report.outcome("cleanup"), Some(JobOutcome::Failed));
    assert!(!report.job("cleanup").unwrap().required);
    assert_eq!(report.status, ExecutionStatus::Succeeded);
}

#[tokio::test]
async fn test_continue_on_error_degrades() {
    let yaml = r#"
on: push
jobs:
  build:
    steps:
      - name: Lint
        run: exit 1
        continue-on-error: true
      - name: Compile
        run: cargo build
  publish:
    needs: build
    steps: [ { run: echo publish } ]
"#;
    let harness = Harness::new(&[]);
    let report = harness.run(yaml, RepositoryEvent::push("main")).await;

    let build = report.job("build").unwrap();
    assert_eq!(build.outcome, JobOutcome::Succeeded);
    assert_eq!(build.degraded_steps, vec!["Lint"]);
    assert_eq!(harness.scripted.calls_for("build").len(), 2);
    assert_eq!(report.outcome("publish"), Some(JobOutcome::Succeeded));

    let records = harness.memory.records().await;
    let build_record = records.iter().find(|r| r.job == "build").unwrap();
    assert_eq!(build_record.degraded_steps, vec!["Lint"]);
}

#[tokio::test]
async fn test_event_conditions() {
    let yaml = r#"
on: [push, release]
jobs:
  main-only:
    if: github.ref == 'refs/heads/main'
    steps: [ { run: echo main } ]
  tagged:
    if: startsWith(github.ref, 'refs/tags/v') && !contains(event.tag, 'rc')
    steps: [ { run: echo tagged } ]
"#;
    let harness = Harness::new(&[]);
    let report = harness.run(yaml, RepositoryEvent::push("main")).await;
    assert_eq!(report.outcome("main-only"), Some(JobOutcome::Succeeded));
    assert_eq!(report.outcome("tagged"), Some(JobOutcome::Skipped));

    let harness = Harness::new(&[]);
    let report = harness
        .run(yaml, RepositoryEvent::release("v2.0.0", "published"))
        .await;
    assert_eq!(report.outcome("main-only"), Some(JobOutcome::Skipped));
    assert_eq!(report.outcome("tagged"), Some(JobOutcome::Succeeded));

    let harness = Harness::new(&[]);
    let report = harness
        .run(yaml, RepositoryEvent::release("v2.0.0-rc1", "published"))
        .await;
    assert_eq!(report.outcome("tagged"), Some(JobOutcome::Skipped));
}

/// failure() sees direct dependencies only; a skipped one is not a failure
#[tokio::test]
async fn test_failure_scope_is_direct_dependencies() {
    let yaml = r#"
on: push
jobs:
  a:
    steps: [ { run: exit 1 } ]
  b:
    needs: a
    steps: [ { run: echo b } ]
  c:
    needs: b
    if: failure()
    steps: [ { run: echo c } ]
  d:
    needs: [a, b]
    if: failure()
    steps: [ { run: echo d } ]
"#;
    let harness = Harness::new(&[]);
    let report = harness.run(yaml, RepositoryEvent::push("main")).await;

    assert_eq!(report.outcome("a"), Some(JobOutcome::Failed));
    assert_eq!(report.outcome("b"), Some(JobOutcome::Skipped));
    assert_eq!(report.outcome("c"), Some(JobOutcome::Skipped));
    assert_eq!(report.outcome("d"), Some(JobOutcome::Succeeded));
}
