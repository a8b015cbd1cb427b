//! Definitions rejected at load time

use gantry::collaborator::{ActionRegistry, ShellTool};
use gantry::core::{DefinitionError, PipelineDefinition};
use gantry::execution::ExecutionEngine;
use gantry::reporting::Reporter;
use gantry::secrets::SecretVault;
use std::sync::Arc;

fn engine() -> ExecutionEngine {
    ExecutionEngine::new(
        ActionRegistry::new(Arc::new(ShellTool::default())),
        SecretVault::from_map(Vec::<(String, String)>::new()),
        Reporter::default(),
    )
}

#[test]
fn test_unknown_action_fails_at_load() {
    let yaml = r#"
on: push
jobs:
  build:
    steps:
      - run: cargo build
      - uses: actions-rs/toolchain@v1
"#;
    let definition = PipelineDefinition::from_yaml(yaml).unwrap();
    match engine().prepare(definition) {
        Err(DefinitionError::UnknownAction { job, action, .. }) => {
            assert_eq!(job, "build");
            assert_eq!(action, "actions-rs/toolchain@v1");
        }
        other => panic!("expected unknown action, got {:?}", other.map(|p| p.name().to_string())),
    }
}

#[test]
fn test_cycle_reported_with_path() {
    let yaml = r#"
on: push
jobs:
  a:
    needs: c
    steps: [ { run: echo a } ]
  b:
    needs: a
    steps: [ { run: echo b } ]
  c:
    needs: b
    steps: [ { run: echo c } ]
"#;
    match PipelineDefinition::from_yaml(yaml) {
        Err(DefinitionError::CycleDetected { cycle }) => {
            assert_eq!(cycle.first(), cycle.last());
            for job in ["a", "b", "c"] {
                assert!(cycle.iter().any(|j| j == job), "{:?}", cycle);
            }
        }
        other => panic!("expected cycle, got {:?}", other.map(|d| d.name)),
    }
}

#[test]
fn test_acyclic_graph_loads() {
    let yaml = r#"
on: push
jobs:
  a:
    steps: [ { run: echo a } ]
  b:
    needs: a
    steps: [ { run: echo b } ]
  c:
    needs: [a, b]
    steps: [ { run: echo c } ]
"#;
    let definition = PipelineDefinition::from_yaml(yaml).unwrap();
    assert_eq!(definition.graph.topological_order(), vec!["a", "b", "c"]);
}

#[test]
fn test_unknown_dependency() {
    let yaml = "on: push\njobs:\n  publish:\n    needs: build\n    steps: [ { run: x } ]\n";
    assert!(matches!(
        PipelineDefinition::from_yaml(yaml),
        Err(DefinitionError::UnknownDependency { .. })
    ));
}

#[test]
fn test_bad_condition() {
    let yaml = "on: push\njobs:\n  a:\n    if: event.kind ==\n    steps: [ { run: x } ]\n";
    assert!(matches!(
        PipelineDefinition::from_yaml(yaml),
        Err(DefinitionError::InvalidCondition { .. })
    ));
}

#[test]
fn test_condition_needs_must_be_declared() {
    let yaml = r#"
on: push
jobs:
  build:
    steps: [ { run: x } ]
  report:
    if: needs.build.result == 'failure'
    steps: [ { run: x } ]
"#;
    assert!(PipelineDefinition::from_yaml(yaml).is_err());
}

#[test]
fn test_overflowing_timeout_rejected() {
    let job_level = r#"
on: push
jobs:
  build:
    timeout-minutes: 18446744073709551615
    steps: [ { run: cargo build } ]
"#;
    match PipelineDefinition::from_yaml(job_level) {
        Err(DefinitionError::InvalidJob { job, reason }) => {
            assert_eq!(job, "build");
            assert!(reason.contains("timeout-minutes"), "{}", reason);
        }
        other => panic!("expected invalid job, got {:?}", other.map(|d| d.name)),
    }

    let step_level = r#"
on: push
jobs:
  build:
    steps:
      - run: cargo build
        timeout-minutes: 18446744073709551615
"#;
    assert!(matches!(
        PipelineDefinition::from_yaml(step_level),
        Err(DefinitionError::InvalidStep { index: 0, .. })
    ));
}
