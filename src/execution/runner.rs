//! Step runner - executes one job's steps in order

use crate::collaborator::{ArtifactRef, Collaborator, Invocation, InvocationResult};
use crate::core::condition::resolve_event_path;
use crate::core::error::StepError;
use crate::core::job::Job;
use crate::core::pipeline::PipelineDefinition;
use crate::core::state::JobOutcome;
use crate::core::step::{Step, StepKind};
use crate::core::template::{self, Placeholder};
use crate::core::trigger::RepositoryEvent;
use crate::execution::engine::{EventEmitter, ExecutionEvent};
use crate::reporting::{ArtifactRecord, Reporter};
use crate::secrets::SecretScope;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything one job execution needs
pub struct JobRun<'a> {
    pub run_id: Uuid,
    pub pipeline: &'a PipelineDefinition,
    pub job: &'a Job,
    /// Handler per step, bound at load time
    pub handlers: &'a [Arc<dyn Collaborator>],
    pub scope: SecretScope,
    pub event: &'a RepositoryEvent,
}

/// Result of running a job's steps
#[derive(Debug, Clone)]
pub struct JobRunResult {
    /// `Succeeded` or `Failed`
    pub outcome: JobOutcome,
    /// Redacted failure reason
    pub reason: Option<String>,
    pub degraded_steps: Vec<String>,
    pub artifacts: Vec<ArtifactRef>,
}

/// Executes a job's steps strictly in declared order
pub struct StepRunner {
    reporter: Arc<Reporter>,
    events: EventEmitter,
    default_timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl StepRunner {
    pub fn new(reporter: Arc<Reporter>, events: EventEmitter) -> Self {
        Self {
            reporter,
            events,
            default_timeout: Duration::from_secs(60 * 60),
            working_dir: None,
        }
    }

    pub fn with_default_timeout(mut self, default_timeout: Duration) -> Self {
        self.default_timeout = default_timeout;
        self
    }

    pub fn with_working_dir(mut self, working_dir: Option<PathBuf>) -> Self {
        self.working_dir = working_dir;
        self
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Run every step; stop at the first failure unless the step continues
    /// on error. Secret failures always stop the job.
    pub async fn run_job(&self, run: &JobRun<'_>) -> JobRunResult {
        let redactor = run.scope.redactor();
        let job = &run.job.name;
        let mut degraded_steps = Vec::new();
        let mut artifacts = Vec::new();

        for (index, step) in run.job.steps.iter().enumerate() {
            self.events.emit(ExecutionEvent::StepStarted {
                job: job.clone(),
                step: step.name.clone(),
                index,
            });

            let result = self.run_step(run, index, step, &mut artifacts).await;
            let error = match result {
                Ok(()) => {
                    self.events.emit(ExecutionEvent::StepFinished {
                        job: job.clone(),
                        step: step.name.clone(),
                    });
                    continue;
                }
                Err(e) => e,
            };

            let reason = redactor.redact(&format!("step '{}' {}", step.name, error));
            let fatal = matches!(error, StepError::Secret(_));
            if step.continue_on_error && !fatal {
                warn!("Job '{}' degraded: {}", job, reason);
                degraded_steps.push(step.name.clone());
                self.events.emit(ExecutionEvent::StepDegraded {
                    job: job.clone(),
                    step: step.name.clone(),
                    error: reason,
                });
                continue;
            }

            warn!("Job '{}' failed: {}", job, reason);
            self.events.emit(ExecutionEvent::StepFailed {
                job: job.clone(),
                step: step.name.clone(),
                error: reason.clone(),
            });
            return JobRunResult {
                outcome: JobOutcome::Failed,
                reason: Some(reason),
                degraded_steps,
                artifacts,
            };
        }

        JobRunResult {
            outcome: JobOutcome::Succeeded,
            reason: None,
            degraded_steps,
            artifacts,
        }
    }

    async fn run_step(
        &self,
        run: &JobRun<'_>,
        index: usize,
        step: &Step,
        artifacts: &mut Vec<ArtifactRef>,
    ) -> Result<(), StepError> {
        let handler = run.handlers.get(index).ok_or_else(|| {
            StepError::Collaborator(format!("no handler bound for step {}", index))
        })?;

        let env = self.render_env(run, step)?;
        let params = match &step.kind {
            StepKind::Run { command } => {
                let mut params = BTreeMap::new();
                params.insert("run".to_string(), render(command, run, &env)?);
                params
            }
            StepKind::Action { with, .. } => with
                .iter()
                .map(|(k, v)| Ok((k.clone(), render(v, run, &env)?)))
                .collect::<Result<BTreeMap<_, _>, StepError>>()?,
        };

        let step_timeout = step
            .timeout
            .or(run.job.timeout)
            .unwrap_or(self.default_timeout);
        let invocation = Invocation {
            action_id: step.action_id().unwrap_or("run").to_string(),
            params,
            env,
            timeout: step_timeout,
            working_dir: self.working_dir.clone(),
        };

        info!("Job '{}' step {}: {}", run.job.name, index + 1, step.name);
        let result: InvocationResult = match timeout(step_timeout, handler.invoke(&invocation)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => return Err(StepError::Collaborator(e.to_string())),
            Err(_) => return Err(StepError::Timeout(step_timeout.as_secs())),
        };
        drop(invocation);

        // Forward as soon as the step returns, even if it failed
        let redactor = run.scope.redactor();
        for artifact in &result.artifacts {
            let artifact = ArtifactRef {
                kind: redactor.redact(&artifact.kind),
                location: redactor.redact(&artifact.location),
                sink: artifact.sink.as_deref().map(|s| redactor.redact(s)),
            };
            let record = ArtifactRecord {
                run_id: run.run_id,
                pipeline: run.pipeline.name.clone(),
                job: run.job.name.clone(),
                step: step.name.clone(),
                artifact: artifact.clone(),
            };
            let sink = self.reporter.forward_routed(&record).await;
            self.events.emit(ExecutionEvent::ArtifactForwarded {
                job: run.job.name.clone(),
                step: step.name.clone(),
                artifact: artifact.clone(),
                sink,
            });
            artifacts.push(artifact);
        }

        let output = result.output.trim();
        if !output.is_empty() {
            let output = redactor.redact(output);
            debug!("{} / {} output:\n{}", run.job.name, step.name, output);
            self.events.emit(ExecutionEvent::StepOutput {
                job: run.job.name.clone(),
                step: step.name.clone(),
                output,
            });
        }

        if result.is_success() {
            Ok(())
        } else {
            Err(StepError::NonZeroExit(result.exit_code))
        }
    }

    /// Built-in vars, then pipeline, job and step env; each layer may
    /// reference the layers beneath it through `env.*`
    fn render_env(&self, run: &JobRun<'_>, step: &Step) -> Result<BTreeMap<String, String>, StepError> {
        let mut env = BTreeMap::new();
        env.insert("CI".to_string(), "true".to_string());
        env.insert("GANTRY_RUN_ID".to_string(), run.run_id.to_string());
        env.insert("GANTRY_PIPELINE".to_string(), run.pipeline.name.clone());
        env.insert("GANTRY_JOB".to_string(), run.job.name.clone());
        env.insert("GANTRY_EVENT_NAME".to_string(), run.event.kind.to_string());
        if let Some(git_ref) = run.event.git_ref() {
            env.insert("GANTRY_REF".to_string(), git_ref);
        }

        for layer in [&run.pipeline.env, &run.job.env, &step.env] {
            let mut rendered = Vec::with_capacity(layer.len());
            for (key, value) in layer {
                rendered.push((key.clone(), render(value, run, &env)?));
            }
            env.extend(rendered);
        }
        Ok(env)
    }
}

fn render(text: &str, run: &JobRun<'_>, env: &BTreeMap<String, String>) -> Result<String, StepError> {
    template::render(text, |placeholder| match placeholder {
        Placeholder::Secret(name) => Ok(run.scope.resolve(name)?.expose().to_string()),
        Placeholder::Env(name) => Ok(env.get(name).cloned().unwrap_or_default()),
        Placeholder::Event(path) => Ok(resolve_event_path(run.event, path).as_text()),
    })
}
