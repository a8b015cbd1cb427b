//! Pipeline definitions from YAML
//!
//! The accepted document is the workflow subset the engine understands:
//! `name`, `on`, `env` and `jobs` with `needs`, `if`, `runs-on`, `env`,
//! `timeout-minutes` and `steps` (`uses`/`with` or `run`).

use crate::core::condition::Condition;
use crate::core::error::DefinitionError;
use crate::core::job::Job;
use crate::core::pipeline::PipelineDefinition;
use crate::core::step::{Step, StepKind};
use crate::core::trigger::{EventKind, RefPattern, TriggerFilter, TriggerSpec};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// A string or a list of strings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// The `on:` section
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TriggersConfig {
    /// `on: push`
    Single(String),
    /// `on: [push, release]`
    List(Vec<String>),
    /// `on: { push: { branches: [main] }, release: { types: [created] } }`
    Filtered(BTreeMap<String, Option<TriggerFilterConfig>>),
}

/// Filter under one event kind
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerFilterConfig {
    #[serde(default)]
    pub branches: Option<OneOrMany>,
    #[serde(default)]
    pub tags: Option<OneOrMany>,
    #[serde(default)]
    pub types: Option<OneOrMany>,
}

/// Top-level pipeline document
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name (defaults to the file stem)
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub on: Option<TriggersConfig>,

    /// Pipeline-wide environment
    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    /// Jobs in declaration order
    #[serde(with = "ordered_jobs")]
    pub jobs: Vec<(String, JobConfig)>,
}

/// Job as written in YAML
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobConfig {
    #[serde(default)]
    pub needs: Option<OneOrMany>,

    #[serde(default, rename = "if")]
    pub condition: Option<Value>,

    #[serde(default)]
    pub runs_on: Option<Value>,

    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    #[serde(default)]
    pub timeout_minutes: Option<u64>,

    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// Step as written in YAML
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StepConfig {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub uses: Option<String>,

    #[serde(default)]
    pub run: Option<String>,

    #[serde(default)]
    pub with: BTreeMap<String, Value>,

    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    #[serde(default)]
    pub continue_on_error: bool,

    #[serde(default)]
    pub timeout_minutes: Option<u64>,

    /// Rejected: conditions are per job
    #[serde(default, rename = "if")]
    pub condition: Option<Value>,
}

/// Keeps the `jobs:` mapping in document order
mod ordered_jobs {
    use super::JobConfig;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_yaml::{Mapping, Value};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, JobConfig)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mapping = Mapping::deserialize(deserializer)?;
        let mut jobs = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            let name = match key {
                Value::String(s) => s,
                other => return Err(D::Error::custom(format!("job name must be a string, got {:?}", other))),
            };
            let job = serde_yaml::from_value::<JobConfig>(value)
                .map_err(|e| D::Error::custom(format!("job '{}': {}", name, e)))?;
            jobs.push((name, job));
        }
        Ok(jobs)
    }
}

/// Render a YAML scalar as a string
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

fn scalar_map(
    map: &BTreeMap<String, Value>,
    invalid: impl Fn(String) -> DefinitionError,
) -> Result<BTreeMap<String, String>, DefinitionError> {
    map.iter()
        .map(|(k, v)| {
            scalar(v)
                .map(|s| (k.clone(), s))
                .ok_or_else(|| invalid(format!("'{}' must be a scalar", k)))
        })
        .collect()
}

/// `timeout-minutes` as a duration, rejecting values that overflow seconds
fn minutes(m: Option<u64>) -> Result<Option<Duration>, String> {
    m.map(|m| {
        m.checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("timeout-minutes {} is out of range", m))
    })
    .transpose()
}

impl PipelineConfig {
    /// Load a pipeline definition from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        if config.name.is_none() {
            config.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned());
        }
        Ok(config)
    }

    /// Parse a pipeline definition from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, DefinitionError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn pipeline_name(&self) -> &str {
        self.name.as_deref().unwrap_or("pipeline")
    }

    /// Validate without keeping the result
    pub fn validate(&self) -> Result<(), DefinitionError> {
        self.to_definition().map(|_| ())
    }

    /// Convert to the immutable domain model, validating everything
    pub fn to_definition(&self) -> Result<PipelineDefinition, DefinitionError> {
        let triggers = self.triggers()?;
        let env = scalar_map(&self.env, DefinitionError::InvalidEnv)?;

        let jobs = self
            .jobs
            .iter()
            .map(|(name, job)| job.to_job(name))
            .collect::<Result<Vec<_>, _>>()?;

        PipelineDefinition::new(self.pipeline_name(), triggers, env, jobs)
    }

    fn triggers(&self) -> Result<Vec<TriggerSpec>, DefinitionError> {
        let Some(on) = &self.on else {
            return Ok(Vec::new());
        };

        match on {
            TriggersConfig::Single(kind) => Ok(vec![TriggerSpec::new(kind.parse()?)]),
            TriggersConfig::List(kinds) => kinds
                .iter()
                .map(|k| k.parse::<EventKind>().map(TriggerSpec::new))
                .collect(),
            TriggersConfig::Filtered(map) => map
                .iter()
                .map(|(kind, filter)| {
                    let kind: EventKind = kind.parse()?;
                    let filter = match filter {
                        Some(f) => f.to_filter()?,
                        None => TriggerFilter::default(),
                    };
                    Ok(TriggerSpec { kind, filter })
                })
                .collect(),
        }
    }
}

impl TriggerFilterConfig {
    fn to_filter(&self) -> Result<TriggerFilter, DefinitionError> {
        let patterns = |list: &Option<OneOrMany>| -> Result<Vec<RefPattern>, DefinitionError> {
            list.clone()
                .map(OneOrMany::into_vec)
                .unwrap_or_default()
                .iter()
                .map(|p| RefPattern::new(p))
                .collect()
        };

        Ok(TriggerFilter {
            branches: patterns(&self.branches)?,
            tags: patterns(&self.tags)?,
            types: self
                .types
                .clone()
                .map(OneOrMany::into_vec)
                .unwrap_or_default(),
        })
    }
}

impl JobConfig {
    fn to_job(&self, name: &str) -> Result<Job, DefinitionError> {
        let invalid = |reason: String| DefinitionError::InvalidJob {
            job: name.to_string(),
            reason,
        };

        if self.steps.is_empty() {
            return Err(invalid("declares no steps".to_string()));
        }

        let condition = match &self.condition {
            None => None,
            Some(value) => {
                let source = scalar(value).ok_or_else(|| invalid("'if' must be a scalar".to_string()))?;
                Some(Condition::parse(&source)?)
            }
        };

        let runs_on = match &self.runs_on {
            None => None,
            Some(Value::Sequence(labels)) => Some(
                labels
                    .iter()
                    .filter_map(scalar)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            Some(value) => scalar(value),
        };

        let steps = self
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| step.to_step(name, index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Job {
            name: name.to_string(),
            needs: self.needs.clone().map(OneOrMany::into_vec).unwrap_or_default(),
            condition,
            env: scalar_map(&self.env, invalid)?,
            runs_on,
            timeout: minutes(self.timeout_minutes).map_err(&invalid)?,
            steps,
        })
    }
}

impl StepConfig {
    fn to_step(&self, job: &str, index: usize) -> Result<Step, DefinitionError> {
        let invalid = |reason: String| DefinitionError::InvalidStep {
            job: job.to_string(),
            index,
            reason,
        };

        if self.condition.is_some() {
            return Err(invalid("step-level 'if' is not supported".to_string()));
        }

        let mut step = match (&self.uses, &self.run) {
            (Some(id), None) => {
                if id.trim().is_empty() {
                    return Err(invalid("'uses' must not be empty".to_string()));
                }
                let mut step = Step::action(id.trim());
                if let StepKind::Action { with, .. } = &mut step.kind {
                    *with = scalar_map(&self.with, &invalid)?;
                }
                step
            }
            (None, Some(command)) => {
                if !self.with.is_empty() {
                    return Err(invalid("'with' is only valid on 'uses' steps".to_string()));
                }
                Step::run(command.clone())
            }
            (Some(_), Some(_)) => {
                return Err(invalid("declares both 'uses' and 'run'".to_string()))
            }
            (None, None) => return Err(invalid("declares neither 'uses' nor 'run'".to_string())),
        };

        if let Some(name) = &self.name {
            step.name = name.clone();
        }
        step.env = scalar_map(&self.env, &invalid)?;
        step.continue_on_error = self.continue_on_error;
        step.timeout = minutes(self.timeout_minutes).map_err(&invalid)?;
        Ok(step)
    }
}
