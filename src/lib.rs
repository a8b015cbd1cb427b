//! gantry - event-driven CI pipeline orchestration
//!
//! Repository events select pipelines, pipelines fan out into a graph of
//! jobs, and jobs run their steps through pluggable collaborators while
//! secrets stay scoped to the jobs that declare them.

pub mod cli;
pub mod collaborator;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod reporting;
pub mod secrets;

// Re-export commonly used types
pub use collaborator::{ActionRegistry, ArtifactRef, Capability, Collaborator, Invocation, InvocationResult};
pub use core::{
    DefinitionError, EngineError, EngineSettings, ExecutionStatus, JobOutcome, PipelineDefinition,
    RepositoryEvent, RunReport,
};
pub use execution::{EventMatcher, ExecutionEngine, ExecutionEvent, PreparedPipeline, SchedulingStrategy};
pub use reporting::{ReportSink, Reporter};
pub use secrets::{SecretStore, SecretVault};
