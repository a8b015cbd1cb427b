//! Secret scoping and redaction

use crate::helpers::*;
use gantry::core::{JobOutcome, RepositoryEvent};
use gantry::execution::ExecutionEvent;

const TOKEN: &str = "tok_9f8e7d6c5b4a";

const DEPLOY: &str = r#"
on: push
jobs:
  build:
    steps:
      - run: echo building
  deploy:
    needs: build
    env:
      DEPLOY_TOKEN: ${{ secrets.DEPLOY_TOKEN }}
    steps:
      - name: Announce
        run: echo deploying with ${{ secrets.DEPLOY_TOKEN }}
      - name: Upload
        run: artifact log /tmp/${{ secrets.DEPLOY_TOKEN }}/deploy.log
      - name: Push
        run: reject auth failed for ${{ secrets.DEPLOY_TOKEN }}
"#;

/// Secret values reach the collaborator but nothing observable
#[tokio::test]
async fn test_secret_values_never_reported() {
    let harness = Harness::new(&[("DEPLOY_TOKEN", TOKEN)]);
    let report = harness.run(DEPLOY, RepositoryEvent::push("main")).await;

    let calls = harness.scripted.calls_for("deploy");
    assert_eq!(calls[0].env["DEPLOY_TOKEN"], TOKEN);
    assert_eq!(calls[0].command, format!("echo deploying with {}", TOKEN));

    assert_eq!(report.outcome("deploy"), Some(JobOutcome::Failed));
    let reason = report.job("deploy").unwrap().reason.clone().unwrap();
    assert!(reason.contains("auth failed for ***"), "{}", reason);
    assert_eq!(report.artifacts[0].location, "/tmp/***/deploy.log");

    let observed = harness.observed_text().await;
    assert!(!observed.contains(TOKEN), "secret leaked: {}", observed);
    assert!(!format!("{:?}", report).contains(TOKEN));

    let outputs: Vec<String> = harness
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ExecutionEvent::StepOutput { output, .. } => Some(output),
            _ => None,
        })
        .collect();
    assert!(outputs.contains(&"echo deploying with ***".to_string()));
}

/// Jobs that do not reference a secret never see it
#[tokio::test]
async fn test_secrets_scoped_to_referencing_job() {
    let harness = Harness::new(&[("DEPLOY_TOKEN", TOKEN)]);
    harness.run(DEPLOY, RepositoryEvent::push("main")).await;

    let build = harness.scripted.calls_for("build");
    assert_eq!(build.len(), 1);
    assert!(!build[0].env.contains_key("DEPLOY_TOKEN"));
    assert!(build[0].env.values().all(|v| !v.contains(TOKEN)));
}

/// A secret the store lacks fails only the job that needs it
#[tokio::test]
async fn test_missing_secret_fails_only_its_job() {
    let yaml = r#"
on: push
jobs:
  build:
    steps: [ { run: echo building } ]
  publish:
    steps:
      - name: Login
        run: login ${{ secrets.MISSING_TOKEN }}
        continue-on-error: true
  docs:
    steps: [ { run: echo docs } ]
"#;
    let harness = Harness::new(&[]);
    let report = harness.run(yaml, RepositoryEvent::push("main")).await;

    assert_eq!(report.outcome("build"), Some(JobOutcome::Succeeded));
    assert_eq!(report.outcome("docs"), Some(JobOutcome::Succeeded));
    // continue-on-error does not cover secret resolution
    assert_eq!(report.outcome("publish"), Some(JobOutcome::Failed));
    let reason = report.job("publish").unwrap().reason.clone().unwrap();
    assert!(reason.contains("MISSING_TOKEN"), "{}", reason);
    assert!(harness.scripted.calls_for("publish").is_empty());
}

/// Pipeline-level env secrets are visible to every job
#[tokio::test]
async fn test_pipeline_env_secret() {
    let yaml = r#"
on: push
env:
  NPM_TOKEN: ${{ secrets.NPM_TOKEN }}
jobs:
  install:
    steps: [ { run: npm ci } ]
"#;
    let harness = Harness::new(&[("NPM_TOKEN", "npm_abcdef")]);
    let report = harness.run(yaml, RepositoryEvent::push("main")).await;
    assert_eq!(report.outcome("install"), Some(JobOutcome::Succeeded));
    assert_eq!(harness.scripted.calls_for("install")[0].env["NPM_TOKEN"], "npm_abcdef");
}

/// A secret in the artifact kind is masked before routing and reporting
#[tokio::test]
async fn test_secret_in_artifact_kind_masked() {
    let yaml = r#"
on: push
jobs:
  report:
    steps:
      - name: Upload
        run: artifact ${{ secrets.DEPLOY_TOKEN }} report.xml
"#;
    let harness = Harness::new(&[("DEPLOY_TOKEN", TOKEN)]);
    let report = harness.run(yaml, RepositoryEvent::push("main")).await;

    assert_eq!(report.outcome("report"), Some(JobOutcome::Succeeded));
    assert_eq!(report.artifacts[0].kind, "***");
    assert_eq!(report.artifacts[0].location, "report.xml");

    let observed = harness.observed_text().await;
    assert!(!observed.contains(TOKEN), "secret leaked: {}", observed);
    assert!(!format!("{:?}", report).contains(TOKEN));
    assert!(harness.events().iter().all(|e| match e {
        ExecutionEvent::ArtifactForwarded { artifact, .. } => artifact.kind == "***",
        _ => true,
    }));
}
