//! Job domain model

use crate::core::condition::Condition;
use crate::core::step::Step;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// A named unit of work with dependencies and ordered steps
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique within the pipeline
    pub name: String,

    /// Names of jobs that must be terminal first
    pub needs: Vec<String>,

    /// Run-condition (`if:`)
    pub condition: Option<Condition>,

    pub env: BTreeMap<String, String>,

    /// Informational runner label
    pub runs_on: Option<String>,

    pub timeout: Option<Duration>,

    pub steps: Vec<Step>,
}

impl Job {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            needs: Vec::new(),
            condition: None,
            env: BTreeMap::new(),
            runs_on: None,
            timeout: None,
            steps: Vec::new(),
        }
    }

    pub fn needs(mut self, dependency: impl Into<String>) -> Self {
        self.needs.push(dependency.into());
        self
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// True when the condition accepts failed or skipped dependencies
    pub fn overrides_upstream(&self) -> bool {
        self.condition
            .as_ref()
            .is_some_and(Condition::overrides_upstream)
    }

    /// Required jobs decide the run status
    pub fn is_required(&self) -> bool {
        !self.overrides_upstream()
    }

    /// Secret names referenced by the job's env and steps
    pub fn referenced_secrets(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self
            .env
            .values()
            .flat_map(|v| crate::core::template::secret_references(v))
            .collect();
        for step in &self.steps {
            names.extend(step.referenced_secrets());
        }
        names
    }
}
