//! Collaborator results and errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix of the stdout line a step uses to announce an artifact:
/// `::artifact::<kind>::<location>`
pub const ARTIFACT_MARKER: &str = "::artifact::";

/// Error types for collaborator calls
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("failed to spawn: {0}")]
    Spawn(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Handle to an artifact produced by a step (e.g. a coverage report)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub kind: String,
    pub location: String,

    /// Explicit target sink; otherwise routed by kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<String>,
}

impl ArtifactRef {
    pub fn new(kind: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            location: location.into(),
            sink: None,
        }
    }

    pub fn to_sink(mut self, sink: impl Into<String>) -> Self {
        self.sink = Some(sink.into());
        self
    }
}

/// Result of one invocation
#[derive(Debug, Clone, Default)]
pub struct InvocationResult {
    pub exit_code: i32,

    /// Artifacts emitted by the call
    pub artifacts: Vec<ArtifactRef>,

    /// Combined output (unredacted)
    pub output: String,
}

impl InvocationResult {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn exited(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }

    pub fn with_artifact(mut self, artifact: ArtifactRef) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Collect `::artifact::<kind>::<location>` lines from tool output
pub fn parse_artifact_markers(output: &str) -> Vec<ArtifactRef> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix(ARTIFACT_MARKER))
        .filter_map(|rest| rest.split_once("::"))
        .filter(|(kind, location)| !kind.is_empty() && !location.is_empty())
        .map(|(kind, location)| ArtifactRef::new(kind, location))
        .collect()
}
