//! Step domain model

use crate::core::error::DefinitionError;
use crate::core::template;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// What a step does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    /// Shell command handed to the tool collaborator
    Run { command: String },

    /// External action reference, e.g. `actions/checkout@v2`
    Action {
        id: String,
        with: BTreeMap<String, String>,
    },
}

/// A single step of a job
#[derive(Debug, Clone)]
pub struct Step {
    /// Display name
    pub name: String,

    pub kind: StepKind,

    /// Step-level environment, layered over the job's
    pub env: BTreeMap<String, String>,

    /// Failure degrades the job instead of failing it
    pub continue_on_error: bool,

    /// Overrides the job timeout
    pub timeout: Option<Duration>,
}

impl Step {
    pub fn run(command: impl Into<String>) -> Self {
        let command = command.into();
        Self {
            name: default_run_name(&command),
            kind: StepKind::Run { command },
            env: BTreeMap::new(),
            continue_on_error: false,
            timeout: None,
        }
    }

    pub fn action(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            kind: StepKind::Action {
                id,
                with: BTreeMap::new(),
            },
            env: BTreeMap::new(),
            continue_on_error: false,
            timeout: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let StepKind::Action { with, .. } = &mut self.kind {
            with.insert(key.into(), value.into());
        }
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn continue_on_error(mut self, value: bool) -> Self {
        self.continue_on_error = value;
        self
    }

    /// Action id, or `None` for `run:` steps
    pub fn action_id(&self) -> Option<&str> {
        match &self.kind {
            StepKind::Run { .. } => None,
            StepKind::Action { id, .. } => Some(id),
        }
    }

    /// Every string of this step that may carry placeholders
    fn templated(&self) -> impl Iterator<Item = &str> {
        let kind: Vec<&str> = match &self.kind {
            StepKind::Run { command } => vec![command.as_str()],
            StepKind::Action { with, .. } => with.values().map(String::as_str).collect(),
        };
        kind.into_iter().chain(self.env.values().map(String::as_str))
    }

    /// Validate every placeholder of the step
    pub fn validate_placeholders(&self) -> Result<(), DefinitionError> {
        for text in self.templated() {
            template::placeholders(text)?;
        }
        Ok(())
    }

    /// Secret names this step references
    pub fn referenced_secrets(&self) -> BTreeSet<String> {
        self.templated()
            .flat_map(template::secret_references)
            .collect()
    }
}

fn default_run_name(command: &str) -> String {
    let first = command.lines().next().unwrap_or_default().trim();
    format!("Run {}", first)
}
