//! Error taxonomy for loading and running pipelines

use crate::core::state::JobOutcome;
use crate::secrets::SecretError;
use thiserror::Error;

/// A pipeline definition could not be loaded. Fatal: no job of the
/// pipeline ever starts.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("Failed to read definition: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse definition: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    #[error("Invalid pipeline env: {0}")]
    InvalidEnv(String),

    #[error("Pipeline '{0}' declares no jobs")]
    NoJobs(String),

    #[error("Duplicate job name: {0}")]
    DuplicateJob(String),

    #[error("Job '{job}' is invalid: {reason}")]
    InvalidJob { job: String, reason: String },

    #[error("Step {index} of job '{job}' is invalid: {reason}")]
    InvalidStep {
        job: String,
        index: usize,
        reason: String,
    },

    #[error("Job '{job}' needs unknown job '{dependency}'")]
    UnknownDependency { job: String, dependency: String },

    #[error("Cycle detected in job dependencies: {}", cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    #[error("Job '{job}' step '{step}' uses unknown action '{action}'")]
    UnknownAction {
        job: String,
        step: String,
        action: String,
    },

    #[error("Invalid condition '{expression}': {reason}")]
    InvalidCondition { expression: String, reason: String },

    #[error("Invalid placeholder '{placeholder}': {reason}")]
    InvalidPlaceholder { placeholder: String, reason: String },
}

/// Why a single step did not succeed
#[derive(Debug, Error)]
pub enum StepError {
    #[error("exited with code {0}")]
    NonZeroExit(i32),

    #[error("timed out after {0} seconds")]
    Timeout(u64),

    #[error("collaborator error: {0}")]
    Collaborator(String),

    #[error("secret resolution failed: {0}")]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Placeholder(#[from] DefinitionError),
}

/// An engine bug surfaced at run time. Always fatal to the run.
#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("scheduling invariant violated for job '{job}': {from:?} -> {to:?}")]
    InvariantViolation {
        job: String,
        from: JobOutcome,
        to: JobOutcome,
    },

    #[error("job '{0}' is not part of this run")]
    UnknownJob(String),

    #[error("outcome of job '{0}' became unobservable before it was terminal")]
    DependencyLost(String),

    #[error("job '{0}' finished the run without a terminal outcome")]
    Unfinished(String),

    #[error("job task failed: {0}")]
    TaskFailed(String),
}

/// Top-level error returned by the execution engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("run aborted: {0}")]
    Scheduling(#[from] SchedulingError),
}
