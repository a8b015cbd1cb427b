//! Artifact forwarding

use crate::helpers::*;
use gantry::core::{JobOutcome, RepositoryEvent};
use gantry::execution::ExecutionEvent;
use gantry::reporting::{MemorySink, Reporter};
use std::sync::Arc;

fn position(events: &[ExecutionEvent], pred: impl Fn(&ExecutionEvent) -> bool) -> usize {
    events
        .iter()
        .position(pred)
        .unwrap_or_else(|| panic!("event not found in {:?}", events))
}

/// Artifacts are forwarded when their step returns, not when the job ends
#[tokio::test]
async fn test_artifact_forwarded_before_next_step() {
    let yaml = r#"
on: push
jobs:
  test:
    steps:
      - name: Coverage
        run: artifact coverage target/cobertura.xml
      - name: Slow teardown
        run: sleep 50
"#;
    let harness = Harness::new(&[]);
    let report = harness.run(yaml, RepositoryEvent::push("main")).await;
    assert_eq!(report.outcome("test"), Some(JobOutcome::Succeeded));

    let events = harness.events();
    let forwarded = position(&events, |e| matches!(e, ExecutionEvent::ArtifactForwarded { .. }));
    let teardown = position(&events, |e| {
        matches!(e, ExecutionEvent::StepStarted { index: 1, .. })
    });
    assert!(forwarded < teardown);

    let artifacts = harness.memory.artifacts().await;
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].job, "test");
    assert_eq!(artifacts[0].step, "Coverage");
    assert_eq!(artifacts[0].artifact.kind, "coverage");
    assert_eq!(artifacts[0].artifact.location, "target/cobertura.xml");
    assert_eq!(report.artifacts.len(), 1);
}

/// A failing step still hands over what it produced
#[tokio::test]
async fn test_artifact_from_failed_step() {
    let yaml = r#"
on: push
jobs:
  test:
    steps:
      - name: Tests
        run: artifact junit target/junit.xml 1
"#;
    let harness = Harness::new(&[]);
    let report = harness.run(yaml, RepositoryEvent::push("main")).await;
    assert_eq!(report.outcome("test"), Some(JobOutcome::Failed));
    assert_eq!(harness.memory.artifacts().await.len(), 1);
}

/// Upload actions emit artifacts for their `file` param
#[tokio::test]
async fn test_upload_action_emits_artifact() {
    let yaml = r#"
on: push
jobs:
  coverage:
    steps:
      - name: Upload coverage
        uses: codecov/codecov-action@v1
        with:
          file: ./cobertura.xml
"#;
    let harness = Harness::new(&[]);
    let report = harness.run(yaml, RepositoryEvent::push("main")).await;
    assert_eq!(report.outcome("coverage"), Some(JobOutcome::Succeeded));

    let artifacts = harness.memory.artifacts().await;
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].artifact.kind, "coverage");
    assert_eq!(artifacts[0].artifact.location, "./cobertura.xml");
}

/// Kind routes pick the sink; other kinds go to the default
#[tokio::test]
async fn test_artifacts_routed_by_kind() {
    let coverage_sink = Arc::new(MemorySink::new());
    let reporter = Reporter::new("memory")
        .with_sink(Arc::new(RenamedSink::new("coverage-store", coverage_sink.clone())))
        .with_route("coverage", "coverage-store");
    let harness = Harness::with_reporter(&[], reporter);

    let yaml = r#"
on: push
jobs:
  test:
    steps:
      - run: artifact coverage cobertura.xml
      - run: artifact log test.log
"#;
    harness.run(yaml, RepositoryEvent::push("main")).await;

    let routed = coverage_sink.artifacts().await;
    assert_eq!(routed.len(), 1);
    assert_eq!(routed[0].artifact.location, "cobertura.xml");

    let default = harness.memory.artifacts().await;
    assert_eq!(default.len(), 1);
    assert_eq!(default[0].artifact.location, "test.log");

    // Outcome records go to every sink
    assert_eq!(coverage_sink.records().await.len(), 1);
    assert_eq!(harness.memory.records().await.len(), 1);
}

/// Wraps a memory sink under another name
struct RenamedSink {
    name: String,
    inner: Arc<MemorySink>,
}

impl RenamedSink {
    fn new(name: &str, inner: Arc<MemorySink>) -> Self {
        Self {
            name: name.to_string(),
            inner,
        }
    }
}

#[async_trait::async_trait]
impl gantry::reporting::ReportSink for RenamedSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn record(&self, record: &gantry::reporting::OutcomeRecord) -> anyhow::Result<()> {
        self.inner.record(record).await
    }

    async fn forward(&self, artifact: &gantry::reporting::ArtifactRecord) -> anyhow::Result<()> {
        self.inner.forward(artifact).await
    }
}
