//! The single surface every external tool is reached through
//!
//! Checkout, toolchain install, test, coverage upload and publish are all
//! [`Collaborator`]s. `run:` steps go to a [`ShellTool`]; `uses:` steps go to
//! whatever the [`ActionRegistry`] bound for the action id at load time.

pub mod command;
pub mod registry;
pub mod response;
pub mod shell;

pub use command::CommandAction;
pub use registry::{ActionRegistry, BoundActions};
pub use response::{parse_artifact_markers, ArtifactRef, CollaboratorError, InvocationResult};
pub use shell::ShellTool;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// What kind of side effect a handler has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Local tool invocation (compiler, test runner, checkout)
    Tool,
    /// Talks to a remote service (registry publish)
    Network,
    /// Hands an artifact to a reporting sink
    ArtifactUpload,
}

/// One call into a collaborator
#[derive(Clone)]
pub struct Invocation {
    /// `run` for shell steps, the action id otherwise
    pub action_id: String,

    /// Rendered parameters (may carry secret values)
    pub params: BTreeMap<String, String>,

    /// Rendered environment (may carry secret values)
    pub env: BTreeMap<String, String>,

    pub timeout: Duration,

    pub working_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(action_id: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            params: BTreeMap::new(),
            env: BTreeMap::new(),
            timeout: Duration::from_secs(3600),
            working_dir: None,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

// Keys only: values may be secrets.
impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("action_id", &self.action_id)
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .field("working_dir", &self.working_dir)
            .finish()
    }
}

/// Uniform call surface for external tools and actions
#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Invoke the tool; a non-zero `exit_code` is a step failure, an `Err`
    /// means the tool could not be invoked at all
    async fn invoke(&self, invocation: &Invocation) -> Result<InvocationResult, CollaboratorError>;

    fn capability(&self) -> Capability;
}
