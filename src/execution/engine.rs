//! Main execution engine - loads pipelines and drives runs

use crate::collaborator::{ActionRegistry, ArtifactRef, BoundActions};
use crate::core::error::{DefinitionError, EngineError};
use crate::core::pipeline::PipelineDefinition;
use crate::core::settings::EngineSettings;
use crate::core::state::{ExecutionStatus, JobOutcome, RunReport};
use crate::core::trigger::RepositoryEvent;
use crate::core::context::ExecutionContext;
use crate::execution::matcher::EventMatcher;
use crate::execution::runner::StepRunner;
use crate::execution::scheduler::{JobScheduler, SchedulingStrategy};
use crate::reporting::Reporter;
use crate::secrets::SecretVault;
use anyhow::Context;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

/// Events that can occur during a pipeline run
///
/// Every string carried here has already been redacted.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        pipeline: String,
        event: RepositoryEvent,
        jobs: usize,
    },
    JobStarted {
        job: String,
    },
    JobSkipped {
        job: String,
        reason: String,
    },
    StepStarted {
        job: String,
        step: String,
        index: usize,
    },
    StepOutput {
        job: String,
        step: String,
        output: String,
    },
    StepFinished {
        job: String,
        step: String,
    },
    /// Failed under `continue-on-error`
    StepDegraded {
        job: String,
        step: String,
        error: String,
    },
    StepFailed {
        job: String,
        step: String,
        error: String,
    },
    ArtifactForwarded {
        job: String,
        step: String,
        artifact: ArtifactRef,
        sink: String,
    },
    JobFinished {
        job: String,
        outcome: JobOutcome,
        reason: Option<String>,
    },
    RunCompleted {
        run_id: Uuid,
        pipeline: String,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Shared list of event handlers
///
/// Handlers are called synchronously from job tasks, so they must be quick.
#[derive(Clone, Default)]
pub struct EventEmitter {
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl EventEmitter {
    pub fn add<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers.push(Arc::new(handler));
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .handlers
            .read()
            .map(|h| h.len())
            .unwrap_or_default();
        f.debug_struct("EventEmitter").field("handlers", &count).finish()
    }
}

/// A validated definition with every step bound to a handler
#[derive(Debug, Clone)]
pub struct PreparedPipeline {
    pub definition: Arc<PipelineDefinition>,
    pub actions: Arc<BoundActions>,
}

impl PreparedPipeline {
    pub fn new(definition: PipelineDefinition, actions: BoundActions) -> Self {
        Self {
            definition: Arc::new(definition),
            actions: Arc::new(actions),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

impl AsRef<PipelineDefinition> for PreparedPipeline {
    fn as_ref(&self) -> &PipelineDefinition {
        &self.definition
    }
}

/// Main pipeline execution engine
pub struct ExecutionEngine {
    registry: ActionRegistry,
    vault: SecretVault,
    reporter: Arc<Reporter>,
    strategy: SchedulingStrategy,
    default_timeout: Duration,
    working_dir: Option<PathBuf>,
    events: EventEmitter,
}

impl ExecutionEngine {
    pub fn new(registry: ActionRegistry, vault: SecretVault, reporter: Reporter) -> Self {
        Self {
            registry,
            vault,
            reporter: Arc::new(reporter),
            strategy: SchedulingStrategy::default(),
            default_timeout: Duration::from_secs(60 * 60),
            working_dir: None,
            events: EventEmitter::default(),
        }
    }

    /// Engine wired from settings: configured actions, secret store chain,
    /// sinks and scheduling strategy
    pub fn from_settings(settings: &EngineSettings) -> anyhow::Result<Self> {
        let store = settings
            .secret_store()
            .context("Failed to set up secret store")?;
        let engine = Self::new(
            ActionRegistry::from_settings(settings),
            SecretVault::new(Arc::new(store)),
            Reporter::from_settings(&settings.reporting),
        )
        .with_strategy(settings.scheduling_strategy())
        .with_default_timeout(settings.default_timeout())
        .with_working_dir(settings.working_dir.clone());
        Ok(engine)
    }

    pub fn with_strategy(mut self, strategy: SchedulingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_working_dir(mut self, working_dir: Option<PathBuf>) -> Self {
        self.working_dir = working_dir;
        self
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.add(handler);
    }

    /// Bind every step to a handler; unknown actions fail here, not mid-run
    pub fn prepare(&self, definition: PipelineDefinition) -> Result<PreparedPipeline, DefinitionError> {
        let actions = self.registry.bind(&definition)?;
        info!(
            "Loaded pipeline '{}' ({} jobs, order: {})",
            definition.name,
            definition.jobs.len(),
            definition.graph.topological_order().join(" -> ")
        );
        Ok(PreparedPipeline::new(definition, actions))
    }

    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<PreparedPipeline, DefinitionError> {
        self.prepare(PipelineDefinition::from_file(path)?)
    }

    /// Pipelines among `pipelines` that the event activates
    pub fn dispatch<'a>(
        &self,
        pipelines: &'a [PreparedPipeline],
        event: &RepositoryEvent,
    ) -> Vec<&'a PreparedPipeline> {
        EventMatcher::select(pipelines, event)
    }

    /// Run one pipeline for one event
    ///
    /// Secrets are resolved once, when the run opens, and dropped with the
    /// run context. A scheduling invariant violation aborts the run.
    pub async fn execute(
        &self,
        pipeline: &PreparedPipeline,
        event: &RepositoryEvent,
    ) -> Result<RunReport, EngineError> {
        let definition = &pipeline.definition;
        let secrets = self.vault.open_run(definition.referenced_secrets());
        let context = Arc::new(ExecutionContext::new(
            event.clone(),
            definition.jobs.iter().map(|j| j.name.clone()),
            secrets,
        ));
        let run_id = context.run_id;
        let started_at = context.started_at;

        info!(
            "Starting run {} of '{}' for {} event",
            run_id, definition.name, event.kind
        );
        self.events.emit(ExecutionEvent::RunStarted {
            run_id,
            pipeline: definition.name.clone(),
            event: event.clone(),
            jobs: definition.jobs.len(),
        });

        let runner = Arc::new(
            StepRunner::new(self.reporter.clone(), self.events.clone())
                .with_default_timeout(self.default_timeout)
                .with_working_dir(self.working_dir.clone()),
        );
        let scheduler = JobScheduler::new(self.strategy, runner);

        let scheduled = match scheduler.drive(pipeline, context).await {
            Ok(scheduled) => scheduled,
            Err(e) => {
                error!("Run {} of '{}' aborted: {}", run_id, definition.name, e);
                self.events.emit(ExecutionEvent::RunCompleted {
                    run_id,
                    pipeline: definition.name.clone(),
                    status: ExecutionStatus::Aborted,
                });
                return Err(EngineError::Scheduling(e));
            }
        };

        let status = RunReport::status_from(&scheduled.jobs);
        let report = RunReport {
            run_id,
            pipeline: definition.name.clone(),
            event: event.clone(),
            status,
            jobs: scheduled.jobs,
            artifacts: scheduled.artifacts,
            started_at,
            completed_at: Utc::now(),
        };

        info!(
            "Run {} of '{}' finished: {:?} ({} succeeded, {} failed, {} skipped)",
            run_id,
            definition.name,
            status,
            report.count(JobOutcome::Succeeded),
            report.count(JobOutcome::Failed),
            report.count(JobOutcome::Skipped)
        );
        self.events.emit(ExecutionEvent::RunCompleted {
            run_id,
            pipeline: definition.name.clone(),
            status,
        });
        Ok(report)
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("registry", &self.registry)
            .field("reporter", &self.reporter)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}
