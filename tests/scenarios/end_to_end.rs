//! Build-and-publish pipelines under push and release events

use crate::helpers::*;
use gantry::core::{ExecutionStatus, JobOutcome, RepositoryEvent};

const BUILD_ONLY: &str = r#"
name: ci
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v2
      - name: Compile
        run: cargo build --release
      - name: Test
        run: cargo test
"#;

const BUILD_AND_PUBLISH: &str = r#"
name: release
on: [push, release]
jobs:
  build:
    steps:
      - uses: actions/checkout@v2
      - name: Compile
        run: cargo build --release
      - name: Test
        run: cargo test
  publish:
    needs: build
    if: event.kind == 'release'
    steps:
      - name: Login
        uses: docker/login-action@v1
        with:
          username: ${{ secrets.REGISTRY_USER }}
          password: ${{ secrets.REGISTRY_TOKEN }}
      - name: Push image
        run: docker push ghcr.io/acme/app:${{ github.ref_name }}
"#;

fn registry_secrets() -> [(&'static str, &'static str); 2] {
    [("REGISTRY_USER", "acme-bot"), ("REGISTRY_TOKEN", "ghp_registry_token_123")]
}

/// A single job whose steps all exit 0 succeeds, with one record
#[tokio::test]
async fn test_single_job_succeeds() {
    let harness = Harness::new(&[]);
    let report = harness.run(BUILD_ONLY, RepositoryEvent::push("main")).await;

    assert_eq!(report.outcome("build"), Some(JobOutcome::Succeeded));
    assert_eq!(report.status, ExecutionStatus::Succeeded);

    let calls = harness.scripted.calls_for("build");
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].action_id, "actions/checkout@v2");
    assert_eq!(calls[1].command, "cargo build --release");
    assert_eq!(calls[2].command, "cargo test");

    let records = harness.memory.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].job, "build");
    assert_eq!(records[0].outcome, JobOutcome::Succeeded);
    assert_eq!(records[0].run_id, report.run_id);
}

/// On push, the release-only job is skipped and never invoked
#[tokio::test]
async fn test_publish_skipped_on_push() {
    let harness = Harness::new(&registry_secrets());
    let report = harness
        .run(BUILD_AND_PUBLISH, RepositoryEvent::push("main"))
        .await;

    assert_eq!(report.outcome("build"), Some(JobOutcome::Succeeded));
    assert_eq!(report.outcome("publish"), Some(JobOutcome::Skipped));
    assert!(report.job("publish").unwrap().reason.as_ref().unwrap().contains("condition"));
    assert!(harness.scripted.calls_for("publish").is_empty());
    assert_eq!(report.status, ExecutionStatus::Succeeded);
}

/// On release, publish runs after build with its secrets resolved
#[tokio::test]
async fn test_publish_runs_on_release() {
    let harness = Harness::new(&registry_secrets());
    let report = harness
        .run(
            BUILD_AND_PUBLISH,
            RepositoryEvent::release("v1.4.0", "created"),
        )
        .await;

    assert_eq!(report.outcome("build"), Some(JobOutcome::Succeeded));
    assert_eq!(report.outcome("publish"), Some(JobOutcome::Succeeded));
    assert_eq!(report.status, ExecutionStatus::Succeeded);

    let publish = harness.scripted.calls_for("publish");
    assert_eq!(publish.len(), 2);
    assert_eq!(publish[0].action_id, "docker/login-action@v1");
    assert_eq!(publish[0].params["username"], "acme-bot");
    assert_eq!(publish[0].params["password"], "ghp_registry_token_123");
    assert_eq!(publish[1].command, "docker push ghcr.io/acme/app:v1.4.0");

    assert_finished_before(&harness.scripted.timeline(), "build", "publish");
}

/// A failing test step fails build and skips publish
#[tokio::test]
async fn test_failed_build_skips_publish() {
    let yaml = BUILD_AND_PUBLISH.replace("run: cargo test", "run: exit 101");
    let harness = Harness::new(&registry_secrets());
    let report = harness
        .run(&yaml, RepositoryEvent::release("v1.4.0", "created"))
        .await;

    assert_eq!(report.outcome("build"), Some(JobOutcome::Failed));
    assert_eq!(
        report.job("build").unwrap().reason.as_deref(),
        Some("step 'Test' exited with code 101")
    );
    assert_eq!(report.outcome("publish"), Some(JobOutcome::Skipped));
    assert!(harness.scripted.calls_for("publish").is_empty());
    assert_eq!(report.status, ExecutionStatus::Failed);

    let records = harness.memory.records().await;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.reason.is_some()));
}
