//! Pipeline execution: event matching, job scheduling and step running

pub mod engine;
pub mod matcher;
pub mod runner;
pub mod scheduler;

pub use engine::{EventEmitter, EventHandler, ExecutionEngine, ExecutionEvent, PreparedPipeline};
pub use matcher::EventMatcher;
pub use runner::{JobRun, JobRunResult, StepRunner};
pub use scheduler::{gate, GateDecision, JobScheduler, ScheduledRun, SchedulingStrategy};
