//! Pipeline selection by event

use crate::helpers::*;
use gantry::core::{EventKind, RepositoryEvent};

const CI: &str = r#"
name: ci
on:
  push:
    branches: [main, 'release/**']
jobs:
  build:
    steps: [ { run: echo ci } ]
"#;

const RELEASE: &str = r#"
name: release
on:
  release:
    types: [created, published]
jobs:
  publish:
    steps: [ { run: echo release } ]
"#;

const TAGS: &str = r#"
name: tags
on:
  push:
    tags: ['v*']
jobs:
  tag:
    steps: [ { run: echo tag } ]
"#;

fn selected(harness: &Harness, event: &RepositoryEvent) -> Vec<String> {
    let pipelines: Vec<_> = [CI, RELEASE, TAGS].iter().map(|y| harness.prepare(y)).collect();
    harness
        .engine
        .dispatch(&pipelines, event)
        .into_iter()
        .map(|p| p.name().to_string())
        .collect()
}

#[test]
fn test_dispatch_by_branch_and_kind() {
    let harness = Harness::new(&[]);
    assert_eq!(selected(&harness, &RepositoryEvent::push("main")), vec!["ci"]);
    assert_eq!(
        selected(&harness, &RepositoryEvent::push("release/1.x/hotfix")),
        vec!["ci"]
    );
    assert!(selected(&harness, &RepositoryEvent::push("feature/login")).is_empty());
}

#[test]
fn test_dispatch_release_types() {
    let harness = Harness::new(&[]);
    assert_eq!(
        selected(&harness, &RepositoryEvent::release("v1.0.0", "created")),
        vec!["release"]
    );
    assert!(selected(&harness, &RepositoryEvent::release("v1.0.0", "deleted")).is_empty());
}

#[test]
fn test_dispatch_tag_push() {
    let harness = Harness::new(&[]);
    let event = RepositoryEvent::new(EventKind::Push).with_tag("v2.1.0");
    assert_eq!(selected(&harness, &event), vec!["tags"]);
}
