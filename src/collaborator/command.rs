//! Configured handlers for `uses:` actions

use crate::collaborator::{
    ArtifactRef, Capability, Collaborator, CollaboratorError, Invocation, InvocationResult,
    ShellTool,
};
use crate::core::settings::ActionSettings;
use async_trait::async_trait;
use tracing::debug;

/// Params checked, in order, for the artifact location
const LOCATION_PARAMS: [&str; 3] = ["file", "path", "files"];

/// An action backed by an optional shell command
///
/// `with:` params are exported as `INPUT_<NAME>`. Without a command the
/// action is a no-op that succeeds; an `artifact_upload` action also emits
/// an [`ArtifactRef`] for its `file`/`path` param.
#[derive(Debug, Clone)]
pub struct CommandAction {
    capability: Capability,
    command: Option<String>,
    kind: String,
    sink: Option<String>,
    shell: ShellTool,
}

impl CommandAction {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            command: None,
            kind: "artifact".to_string(),
            sink: None,
            shell: ShellTool::default(),
        }
    }

    pub fn from_settings(settings: &ActionSettings, shell: &str) -> Self {
        let mut action = Self::new(settings.capability).with_shell(shell);
        action.command = settings.command.clone();
        if let Some(kind) = &settings.kind {
            action.kind = kind.clone();
        }
        action.sink = settings.sink.clone();
        action
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_sink(mut self, sink: impl Into<String>) -> Self {
        self.sink = Some(sink.into());
        self
    }

    pub fn with_shell(mut self, shell: &str) -> Self {
        self.shell = ShellTool::new(shell);
        self
    }

    fn input_env(invocation: &Invocation) -> Vec<(String, String)> {
        invocation
            .params
            .iter()
            .map(|(k, v)| {
                let name: String = k
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
                    .collect();
                (format!("INPUT_{}", name), v.clone())
            })
            .collect()
    }

    fn artifact_for(&self, invocation: &Invocation) -> Option<ArtifactRef> {
        let location = LOCATION_PARAMS.iter().find_map(|p| invocation.param(p))?;
        let artifact = ArtifactRef::new(self.kind.clone(), location);
        Some(match &self.sink {
            Some(sink) => artifact.to_sink(sink.clone()),
            None => artifact,
        })
    }
}

#[async_trait]
impl Collaborator for CommandAction {
    async fn invoke(&self, invocation: &Invocation) -> Result<InvocationResult, CollaboratorError> {
        let mut result = match &self.command {
            Some(command) => {
                let inputs = Self::input_env(invocation);
                self.shell.run_command(command, invocation, &inputs).await?
            }
            None => {
                debug!("Action '{}' has no command, nothing to run", invocation.action_id);
                InvocationResult::success()
            }
        };

        if self.capability == Capability::ArtifactUpload && result.is_success() {
            match self.artifact_for(invocation) {
                Some(artifact) => result.artifacts.push(artifact),
                None => {
                    return Err(CollaboratorError::InvalidParams(format!(
                        "'{}' needs one of: {}",
                        invocation.action_id,
                        LOCATION_PARAMS.join(", ")
                    )))
                }
            }
        }
        Ok(result)
    }

    fn capability(&self) -> Capability {
        self.capability
    }
}
