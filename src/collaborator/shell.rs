//! Shell tool - runs `run:` commands as a subprocess

use crate::collaborator::{
    parse_artifact_markers, Capability, Collaborator, CollaboratorError, Invocation,
    InvocationResult,
};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs `<shell> -c <command>`
#[derive(Debug, Clone)]
pub struct ShellTool {
    /// Shell program, e.g. "sh" or "/bin/bash"
    shell: String,
}

impl ShellTool {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Run a command with the invocation's env and working directory
    ///
    /// The child is killed if the returned future is dropped, which is how
    /// step timeouts stop it.
    pub(crate) async fn run_command(
        &self,
        command: &str,
        invocation: &Invocation,
        extra_env: &[(String, String)],
    ) -> Result<InvocationResult, CollaboratorError> {
        debug!(
            "Spawning {} for '{}' with {} env vars",
            self.shell,
            invocation.action_id,
            invocation.env.len() + extra_env.len()
        );

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .envs(&invocation.env)
            .envs(extra_env.iter().map(|(k, v)| (k, v)))
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| CollaboratorError::Spawn(format!("{}: {}", self.shell, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);
        if exit_code != 0 {
            warn!("'{}' exited with code {}", invocation.action_id, exit_code);
        }

        let artifacts = parse_artifact_markers(&stdout);
        let mut combined = stdout;
        if !stderr.trim().is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        Ok(InvocationResult {
            exit_code,
            artifacts,
            output: combined,
        })
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new("sh")
    }
}

#[async_trait]
impl Collaborator for ShellTool {
    async fn invoke(&self, invocation: &Invocation) -> Result<InvocationResult, CollaboratorError> {
        let command = invocation
            .param("run")
            .ok_or_else(|| CollaboratorError::InvalidParams("missing 'run' command".to_string()))?;
        self.run_command(command, invocation, &[]).await
    }

    fn capability(&self) -> Capability {
        Capability::Tool
    }
}
