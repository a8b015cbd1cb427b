//! Job scheduler - drives every job of a run to a terminal outcome
//!
//! One task per job is spawned in topological order. A task waits on the
//! outcome slots of its dependencies, evaluates its gate, takes a
//! concurrency permit and runs its steps. Outcome writes go through the
//! per-job slot, so no lock spans a job's execution.

use crate::collaborator::ArtifactRef;
use crate::core::condition::ConditionContext;
use crate::core::context::ExecutionContext;
use crate::core::error::SchedulingError;
use crate::core::job::Job;
use crate::core::state::{JobOutcome, JobReport};
use crate::execution::engine::{ExecutionEvent, PreparedPipeline};
use crate::execution::runner::{JobRun, StepRunner};
use crate::reporting::OutcomeRecord;
use crate::secrets::SecretScope;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Strategy for scheduling job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// One job at a time, in dependency order
    Sequential,

    /// Every eligible job at once
    #[default]
    Parallel,

    /// At most N jobs at once
    LimitedParallel(usize),
}

impl SchedulingStrategy {
    fn permits(&self, jobs: usize) -> usize {
        match self {
            SchedulingStrategy::Sequential => 1,
            SchedulingStrategy::Parallel => jobs.max(1),
            SchedulingStrategy::LimitedParallel(n) => (*n).max(1),
        }
    }
}

/// Whether a job whose dependencies are terminal should run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Run,
    Skip(String),
}

/// Decide whether a job runs, given its dependencies' terminal outcomes
///
/// With an override condition (one using `success()`, `failure()` or
/// `always()`) the condition alone decides. Otherwise every dependency must
/// have succeeded and the condition, if any, must hold.
pub fn gate(job: &Job, ctx: &ConditionContext<'_>) -> GateDecision {
    if let Some(condition) = job.condition.as_ref().filter(|c| c.overrides_upstream()) {
        return if condition.evaluate(ctx) {
            GateDecision::Run
        } else {
            GateDecision::Skip(format!("condition '{}' is false", condition.source()))
        };
    }

    let unmet: Vec<String> = ctx
        .needs
        .iter()
        .filter(|(_, outcome)| **outcome != JobOutcome::Succeeded)
        .map(|(name, outcome)| format!("{} {}", name, outcome))
        .collect();
    if !unmet.is_empty() {
        return GateDecision::Skip(format!("dependency not successful: {}", unmet.join(", ")));
    }

    match &job.condition {
        Some(condition) if !condition.evaluate(ctx) => {
            GateDecision::Skip(format!("condition '{}' is false", condition.source()))
        }
        _ => GateDecision::Run,
    }
}

/// Reports of a drained run
#[derive(Debug, Clone)]
pub struct ScheduledRun {
    /// Declaration order
    pub jobs: Vec<JobReport>,
    /// Artifacts in the order jobs finished
    pub artifacts: Vec<ArtifactRef>,
}

/// Walks the job graph of one run
pub struct JobScheduler {
    strategy: SchedulingStrategy,
    runner: Arc<StepRunner>,
}

struct TaskShared {
    pipeline: PreparedPipeline,
    context: Arc<ExecutionContext>,
    runner: Arc<StepRunner>,
    permits: Semaphore,
}

impl JobScheduler {
    pub fn new(strategy: SchedulingStrategy, runner: Arc<StepRunner>) -> Self {
        Self { strategy, runner }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Drive every job to a terminal outcome
    ///
    /// An invariant violation or a panicked job task aborts all remaining
    /// tasks and is returned as the run's error.
    pub async fn drive(
        &self,
        pipeline: &PreparedPipeline,
        context: Arc<ExecutionContext>,
    ) -> Result<ScheduledRun, SchedulingError> {
        let graph = &pipeline.definition.graph;
        let shared = Arc::new(TaskShared {
            pipeline: pipeline.clone(),
            context: context.clone(),
            runner: self.runner.clone(),
            permits: Semaphore::new(self.strategy.permits(graph.len())),
        });

        let mut tasks = JoinSet::new();
        for &index in graph.order() {
            let shared = shared.clone();
            tasks.spawn(async move { run_job_task(shared, index).await });
        }

        let mut reports: Vec<Option<JobReport>> = vec![None; graph.len()];
        let mut artifacts = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(result) => result,
                Err(e) => Err(SchedulingError::TaskFailed(e.to_string())),
            };
            match outcome {
                Ok((index, report, produced)) => {
                    reports[index] = Some(report);
                    artifacts.extend(produced);
                }
                Err(e) => {
                    error!("Aborting run {}: {}", context.run_id, e);
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        let mut jobs = Vec::with_capacity(reports.len());
        for (index, report) in reports.into_iter().enumerate() {
            let name = graph.name(index);
            let outcome = context.outcomes.get(index)?;
            match report {
                Some(report) if outcome.is_terminal() => jobs.push(report),
                _ => return Err(SchedulingError::Unfinished(name.to_string())),
            }
        }

        Ok(ScheduledRun { jobs, artifacts })
    }
}

async fn run_job_task(
    shared: Arc<TaskShared>,
    index: usize,
) -> Result<(usize, JobReport, Vec<ArtifactRef>), SchedulingError> {
    let definition = &shared.pipeline.definition;
    let context = &shared.context;
    let job = &definition.jobs[index];
    let dependencies = definition.graph.dependencies(index);

    for &dependency in dependencies {
        let outcome = context.outcomes.wait_terminal(dependency).await?;
        debug!(
            "Job '{}' observed '{}' as {}",
            job.name,
            definition.graph.name(dependency),
            outcome
        );
    }

    let needs: BTreeMap<String, JobOutcome> = context.outcomes_of(dependencies)?;
    let decision = gate(
        job,
        &ConditionContext {
            event: &context.event,
            needs: &needs,
        },
    );

    let events = shared.runner.events();
    if let GateDecision::Skip(reason) = decision {
        context.outcomes.transition(index, JobOutcome::Skipped)?;
        info!("Job '{}' skipped: {}", job.name, reason);
        events.emit(ExecutionEvent::JobSkipped {
            job: job.name.clone(),
            reason: reason.clone(),
        });
        let report = JobReport {
            name: job.name.clone(),
            outcome: JobOutcome::Skipped,
            reason: Some(reason),
            degraded_steps: Vec::new(),
            required: job.is_required(),
            started_at: None,
            finished_at: Some(Utc::now()),
        };
        record(&shared, &report).await;
        return Ok((index, report, Vec::new()));
    }

    let permit = shared
        .permits
        .acquire()
        .await
        .map_err(|e| SchedulingError::TaskFailed(e.to_string()))?;

    context.outcomes.transition(index, JobOutcome::Running)?;
    let started_at = Utc::now();
    events.emit(ExecutionEvent::JobStarted {
        job: job.name.clone(),
    });

    let run = JobRun {
        run_id: context.run_id,
        pipeline: definition,
        job,
        handlers: shared.pipeline.actions.job(index),
        scope: SecretScope::new(definition.job_secrets(job), context.secrets.clone()),
        event: &context.event,
    };
    let result = shared.runner.run_job(&run).await;
    drop(run);

    context.outcomes.transition(index, result.outcome)?;
    drop(permit);

    let report = JobReport {
        name: job.name.clone(),
        outcome: result.outcome,
        reason: result.reason,
        degraded_steps: result.degraded_steps,
        required: job.is_required(),
        started_at: Some(started_at),
        finished_at: Some(Utc::now()),
    };
    record(&shared, &report).await;
    Ok((index, report, result.artifacts))
}

async fn record(shared: &TaskShared, report: &JobReport) {
    let record = OutcomeRecord {
        run_id: shared.context.run_id,
        pipeline: shared.pipeline.definition.name.clone(),
        job: report.name.clone(),
        outcome: report.outcome,
        reason: report.reason.clone(),
        degraded_steps: report.degraded_steps.clone(),
        recorded_at: Utc::now(),
    };
    shared.runner.reporter().record(&record).await;
    shared.runner.events().emit(ExecutionEvent::JobFinished {
        job: report.name.clone(),
        outcome: report.outcome,
        reason: report.reason.clone(),
    });
}
