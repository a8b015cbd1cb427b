//! Pipeline domain model

use crate::core::config::PipelineConfig;
use crate::core::error::DefinitionError;
use crate::core::graph::JobGraph;
use crate::core::job::Job;
use crate::core::template;
use crate::core::trigger::{RepositoryEvent, TriggerSpec};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::warn;

/// A loaded, validated pipeline. Immutable after load.
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    pub name: String,

    /// Any matching spec activates the pipeline
    pub triggers: Vec<TriggerSpec>,

    /// Pipeline-wide environment, beneath job and step env
    pub env: BTreeMap<String, String>,

    /// Jobs in declaration order
    pub jobs: Vec<Job>,

    pub graph: JobGraph,
}

impl PipelineDefinition {
    /// Validate the parts and build the job graph
    pub fn new(
        name: impl Into<String>,
        triggers: Vec<TriggerSpec>,
        env: BTreeMap<String, String>,
        jobs: Vec<Job>,
    ) -> Result<Self, DefinitionError> {
        let name = name.into();
        if jobs.is_empty() {
            return Err(DefinitionError::NoJobs(name));
        }
        if triggers.is_empty() {
            warn!("Pipeline '{}' declares no triggers and will never activate", name);
        }

        for value in env.values() {
            template::placeholders(value)?;
        }

        for job in &jobs {
            for value in job.env.values() {
                template::placeholders(value)?;
            }
            for step in &job.steps {
                step.validate_placeholders()?;
            }
            if let Some(condition) = &job.condition {
                for referenced in condition.referenced_needs() {
                    if !job.needs.contains(&referenced) {
                        return Err(DefinitionError::InvalidCondition {
                            expression: condition.source().to_string(),
                            reason: format!(
                                "job '{}' does not need '{}'",
                                job.name, referenced
                            ),
                        });
                    }
                }
            }
        }

        let graph = JobGraph::build(&jobs)?;
        Ok(Self {
            name,
            triggers,
            env,
            jobs,
            graph,
        })
    }

    /// Load and validate a YAML definition file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DefinitionError> {
        PipelineConfig::from_file(path)?.to_definition()
    }

    /// Parse and validate a YAML definition
    pub fn from_yaml(yaml: &str) -> Result<Self, DefinitionError> {
        PipelineConfig::from_yaml(yaml)?.to_definition()
    }

    /// Get a job by name
    pub fn job(&self, name: &str) -> Option<&Job> {
        self.graph.index_of(name).map(|i| &self.jobs[i])
    }

    /// Check if any trigger fires for the event
    pub fn activates_on(&self, event: &RepositoryEvent) -> bool {
        self.triggers.iter().any(|t| t.matches(event))
    }

    /// Secret names a job may resolve: its own plus the pipeline env's
    pub fn job_secrets(&self, job: &Job) -> BTreeSet<String> {
        let mut names = self.env_secrets();
        names.extend(job.referenced_secrets());
        names
    }

    /// Every secret name referenced anywhere in the definition
    pub fn referenced_secrets(&self) -> BTreeSet<String> {
        let mut names = self.env_secrets();
        for job in &self.jobs {
            names.extend(job.referenced_secrets());
        }
        names
    }

    fn env_secrets(&self) -> BTreeSet<String> {
        self.env
            .values()
            .flat_map(|v| template::secret_references(v))
            .collect()
    }
}

impl AsRef<PipelineDefinition> for PipelineDefinition {
    fn as_ref(&self) -> &PipelineDefinition {
        self
    }
}
