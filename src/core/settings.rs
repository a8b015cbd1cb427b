//! Engine settings (`gantry.yml`)

use crate::collaborator::Capability;
use crate::execution::SchedulingStrategy;
use crate::secrets::{ChainedSecretStore, EnvSecretStore, MapSecretStore};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File looked up in the working directory when no path is given
pub const DEFAULT_SETTINGS_FILE: &str = "gantry.yml";

/// How independent jobs are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategySetting {
    Sequential,
    Parallel,
}

/// Engine-wide settings. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub strategy: StrategySetting,

    /// Caps `parallel` scheduling
    pub max_parallel: Option<usize>,

    /// Used when neither step nor job sets `timeout-minutes`
    pub default_timeout_minutes: u64,

    /// Program that runs `run:` commands as `<shell> -c <command>`
    pub shell: String,

    pub working_dir: Option<PathBuf>,

    pub secrets: SecretSettings,

    /// Action id (with or without `@version`) to handler
    pub actions: BTreeMap<String, ActionSettings>,

    pub reporting: ReportingSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretSettings {
    /// Environment lookups use `<prefix><NAME>`
    pub env_prefix: Option<String>,

    /// Dotenv-style files, consulted before the environment
    pub files: Vec<PathBuf>,
}

/// Handler bound to an external action id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSettings {
    pub capability: Capability,

    /// Shell command to run; `with:` params arrive as `INPUT_<NAME>`
    #[serde(default)]
    pub command: Option<String>,

    /// Artifact kind emitted by `artifact_upload` actions
    #[serde(default)]
    pub kind: Option<String>,

    /// Sink the artifact goes to
    #[serde(default)]
    pub sink: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingSettings {
    /// Enables the JSON-lines sink
    pub jsonl: Option<PathBuf>,

    pub default_sink: String,

    /// Artifact kind to sink name
    pub routes: BTreeMap<String, String>,

    /// Save run summaries to the history store
    pub history: bool,
}

impl Default for ReportingSettings {
    fn default() -> Self {
        Self {
            jsonl: None,
            default_sink: "log".to_string(),
            routes: BTreeMap::new(),
            history: true,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            strategy: StrategySetting::Parallel,
            max_parallel: None,
            default_timeout_minutes: 60,
            shell: "sh".to_string(),
            working_dir: None,
            secrets: SecretSettings::default(),
            actions: BTreeMap::new(),
            reporting: ReportingSettings::default(),
        }
    }
}

impl EngineSettings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: EngineSettings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load `path`, or `gantry.yml` if present, or defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None if Path::new(DEFAULT_SETTINGS_FILE).exists() => {
                Self::from_file(DEFAULT_SETTINGS_FILE)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_parallel == Some(0) {
            anyhow::bail!("max_parallel must be at least 1");
        }
        if self.default_timeout_minutes.checked_mul(60).is_none() {
            anyhow::bail!(
                "default_timeout_minutes {} is out of range",
                self.default_timeout_minutes
            );
        }
        if self.shell.trim().is_empty() {
            anyhow::bail!("shell must not be empty");
        }
        for (id, action) in &self.actions {
            if action.capability != Capability::ArtifactUpload
                && (action.kind.is_some() || action.sink.is_some())
            {
                anyhow::bail!(
                    "Action '{}' sets kind/sink but is not an artifact_upload action",
                    id
                );
            }
        }
        Ok(())
    }

    /// Timeout for steps and jobs that set none; saturates on overflow
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_minutes.saturating_mul(60))
    }

    pub fn scheduling_strategy(&self) -> SchedulingStrategy {
        match (self.strategy, self.max_parallel) {
            (StrategySetting::Sequential, _) => SchedulingStrategy::Sequential,
            (StrategySetting::Parallel, Some(n)) => SchedulingStrategy::LimitedParallel(n),
            (StrategySetting::Parallel, None) => SchedulingStrategy::Parallel,
        }
    }

    /// Secret files first, then the environment
    pub fn secret_store(&self) -> Result<ChainedSecretStore> {
        let mut store = ChainedSecretStore::new();
        for file in &self.secrets.files {
            let loaded = MapSecretStore::from_file(file)
                .with_context(|| format!("Failed to read secrets file {}", file.display()))?;
            store = store.with(loaded);
        }
        let env = match &self.secrets.env_prefix {
            Some(prefix) => EnvSecretStore::with_prefix(prefix.clone()),
            None => EnvSecretStore::new(),
        };
        Ok(store.with(env))
    }
}
