//! Core domain models
//!
//! Pipeline definitions and their parts (triggers, jobs, steps, conditions),
//! the YAML configuration they are loaded from, and per-run state.

pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod job;
pub mod pipeline;
pub mod settings;
pub mod state;
pub mod step;
pub mod template;
pub mod trigger;

pub use condition::Condition;
pub use config::PipelineConfig;
pub use context::{ExecutionContext, OutcomeMap};
pub use error::{DefinitionError, EngineError, SchedulingError, StepError};
pub use graph::JobGraph;
pub use job::Job;
pub use pipeline::PipelineDefinition;
pub use settings::EngineSettings;
pub use state::{ExecutionStatus, JobOutcome, JobReport, RunReport};
pub use step::{Step, StepKind};
pub use trigger::{EventKind, RepositoryEvent, TriggerSpec};
