//! Repository events and the trigger specs that match them

use crate::core::error::DefinitionError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of repository event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    Release,
    PullRequest,
    WorkflowDispatch,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::Release => "release",
            EventKind::PullRequest => "pull_request",
            EventKind::WorkflowDispatch => "workflow_dispatch",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "push" => Ok(EventKind::Push),
            "release" => Ok(EventKind::Release),
            "pull_request" => Ok(EventKind::PullRequest),
            "workflow_dispatch" => Ok(EventKind::WorkflowDispatch),
            other => Err(DefinitionError::InvalidTrigger(format!(
                "unsupported event kind '{}'",
                other
            ))),
        }
    }
}

/// Metadata carried by an event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    /// Release/pull request action, e.g. `created`
    #[serde(default)]
    pub action: Option<String>,
}

/// An incoming repository event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEvent {
    pub kind: EventKind,
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl RepositoryEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            metadata: EventMetadata::default(),
        }
    }

    /// A push to a branch
    pub fn push(branch: impl Into<String>) -> Self {
        Self::new(EventKind::Push).with_branch(branch)
    }

    /// A release event for a tag
    pub fn release(tag: impl Into<String>, action: impl Into<String>) -> Self {
        Self::new(EventKind::Release)
            .with_tag(tag)
            .with_action(action)
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.metadata.branch = Some(branch.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.metadata.tag = Some(tag.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.metadata.action = Some(action.into());
        self
    }

    /// Fully qualified git ref (`refs/tags/..` wins over `refs/heads/..`)
    pub fn git_ref(&self) -> Option<String> {
        if let Some(tag) = &self.metadata.tag {
            Some(format!("refs/tags/{}", tag))
        } else {
            self.metadata
                .branch
                .as_ref()
                .map(|b| format!("refs/heads/{}", b))
        }
    }

    /// Short ref name (tag or branch)
    pub fn ref_name(&self) -> Option<&str> {
        self.metadata
            .tag
            .as_deref()
            .or(self.metadata.branch.as_deref())
    }
}

/// A glob over ref names: `*` stays within a segment, `**` crosses `/`
#[derive(Debug, Clone)]
pub struct RefPattern {
    source: String,
    regex: Regex,
}

impl RefPattern {
    pub fn new(pattern: &str) -> Result<Self, DefinitionError> {
        let mut expr = String::from("^");
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' if chars.peek() == Some(&'*') => {
                    chars.next();
                    expr.push_str(".*");
                }
                '*' => expr.push_str("[^/]*"),
                '?' => expr.push_str("[^/]"),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| {
            DefinitionError::InvalidTrigger(format!("bad pattern '{}': {}", pattern, e))
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Optional filter predicate of a trigger
#[derive(Debug, Clone, Default)]
pub struct TriggerFilter {
    pub branches: Vec<RefPattern>,
    pub tags: Vec<RefPattern>,
    /// Accepted event actions (e.g. release `created`)
    pub types: Vec<String>,
}

impl TriggerFilter {
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty() && self.tags.is_empty() && self.types.is_empty()
    }

    fn ref_matches(&self, metadata: &EventMetadata) -> bool {
        if self.branches.is_empty() && self.tags.is_empty() {
            return true;
        }

        let branch_hit = metadata
            .branch
            .as_deref()
            .is_some_and(|b| self.branches.iter().any(|p| p.matches(b)));
        let tag_hit = metadata
            .tag
            .as_deref()
            .is_some_and(|t| self.tags.iter().any(|p| p.matches(t)));

        branch_hit || tag_hit
    }

    fn action_matches(&self, metadata: &EventMetadata) -> bool {
        if self.types.is_empty() {
            return true;
        }
        metadata
            .action
            .as_deref()
            .is_some_and(|a| self.types.iter().any(|t| t.eq_ignore_ascii_case(a)))
    }
}

/// Event kind plus optional filter that activates a pipeline
#[derive(Debug, Clone)]
pub struct TriggerSpec {
    pub kind: EventKind,
    pub filter: TriggerFilter,
}

impl TriggerSpec {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            filter: TriggerFilter::default(),
        }
    }

    /// Check if this trigger fires for the event
    pub fn matches(&self, event: &RepositoryEvent) -> bool {
        self.kind == event.kind
            && self.filter.ref_matches(&event.metadata)
            && self.filter.action_matches(&event.metadata)
    }
}
