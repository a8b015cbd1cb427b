//! Shared harness for scenario tests

use async_trait::async_trait;
use gantry::collaborator::{
    ActionRegistry, ArtifactRef, Capability, Collaborator, CollaboratorError, CommandAction,
    Invocation, InvocationResult,
};
use gantry::core::{PipelineDefinition, RepositoryEvent, RunReport};
use gantry::execution::{ExecutionEngine, ExecutionEvent, PreparedPipeline, SchedulingStrategy};
use gantry::reporting::{MemorySink, Reporter};
use gantry::secrets::SecretVault;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One invocation seen by the scripted collaborator
#[derive(Debug, Clone)]
pub struct Call {
    pub job: String,
    pub action_id: String,
    /// `run:` command, or empty for `uses:` steps
    pub command: String,
    pub params: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
}

/// Collaborator driven by the step's command text
///
/// - `exit N` exits with code N
/// - `sleep MS` sleeps, then succeeds
/// - `artifact KIND LOCATION [CODE]` reports an artifact, exiting with CODE
/// - `reject MESSAGE` returns a collaborator error
/// - anything else succeeds and echoes the command as output
#[derive(Default)]
pub struct ScriptedCollaborator {
    calls: Mutex<Vec<Call>>,
    timeline: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedCollaborator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, job: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.job == job).collect()
    }

    /// `start:<job>` / `end:<job>` in the order they happened
    pub fn timeline(&self) -> Vec<String> {
        self.timeline.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn mark(&self, entry: String) {
        self.timeline.lock().unwrap().push(entry);
    }

    async fn script(&self, command: &str) -> Result<InvocationResult, CollaboratorError> {
        let words: Vec<&str> = command.split_whitespace().collect();
        match words.as_slice() {
            ["exit", code, ..] => Ok(InvocationResult::exited(code.parse().unwrap_or(1))),
            ["sleep", ms, ..] => {
                tokio::time::sleep(Duration::from_millis(ms.parse().unwrap_or(10))).await;
                Ok(InvocationResult::success())
            }
            ["artifact", kind, location, rest @ ..] => {
                let code = rest.first().and_then(|c| c.parse().ok()).unwrap_or(0);
                Ok(InvocationResult::exited(code).with_artifact(ArtifactRef::new(*kind, *location)))
            }
            ["reject", rest @ ..] => Err(CollaboratorError::Internal(rest.join(" "))),
            _ => Ok(InvocationResult::success().with_output(command)),
        }
    }
}

#[async_trait]
impl Collaborator for ScriptedCollaborator {
    async fn invoke(&self, invocation: &Invocation) -> Result<InvocationResult, CollaboratorError> {
        let job = invocation.env.get("GANTRY_JOB").cloned().unwrap_or_default();
        let command = invocation.param("run").unwrap_or_default().to_string();
        self.calls.lock().unwrap().push(Call {
            job: job.clone(),
            action_id: invocation.action_id.clone(),
            command: command.clone(),
            params: invocation.params.clone(),
            env: invocation.env.clone(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.mark(format!("start:{}", job));

        let result = self.script(&command).await;

        self.mark(format!("end:{}", job));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn capability(&self) -> Capability {
        Capability::Tool
    }
}

/// Engine wired to a scripted collaborator, an in-memory sink and an
/// event log
pub struct Harness {
    pub engine: ExecutionEngine,
    pub scripted: Arc<ScriptedCollaborator>,
    pub memory: Arc<MemorySink>,
    pub events: Arc<Mutex<Vec<ExecutionEvent>>>,
}

impl Harness {
    pub fn new(secrets: &[(&str, &str)]) -> Self {
        Self::build(secrets, Reporter::new("memory"))
    }

    pub fn with_reporter(secrets: &[(&str, &str)], reporter: Reporter) -> Self {
        Self::build(secrets, reporter)
    }

    fn build(secrets: &[(&str, &str)], reporter: Reporter) -> Self {
        let scripted = ScriptedCollaborator::new();
        let memory = Arc::new(MemorySink::new());

        let registry = ActionRegistry::new(scripted.clone())
            .with_action("actions/checkout", scripted.clone())
            .with_action("docker/login-action", scripted.clone())
            .with_action(
                "codecov/codecov-action",
                Arc::new(CommandAction::new(Capability::ArtifactUpload).with_kind("coverage")),
            );

        let engine = ExecutionEngine::new(
            registry,
            SecretVault::from_map(secrets.iter().copied()),
            reporter.with_sink(memory.clone()),
        );

        let events = Arc::new(Mutex::new(Vec::new()));
        let log = events.clone();
        engine.add_event_handler(move |event| log.lock().unwrap().push(event));

        Self {
            engine,
            scripted,
            memory,
            events,
        }
    }

    pub fn with_strategy(mut self, strategy: SchedulingStrategy) -> Self {
        self.engine = self.engine.with_strategy(strategy);
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.engine = self.engine.with_default_timeout(timeout);
        self
    }

    pub fn prepare(&self, yaml: &str) -> PreparedPipeline {
        let definition = PipelineDefinition::from_yaml(yaml).unwrap();
        self.engine.prepare(definition).unwrap()
    }

    pub async fn run(&self, yaml: &str, event: RepositoryEvent) -> RunReport {
        let pipeline = self.prepare(yaml);
        self.engine.execute(&pipeline, &event).await.unwrap()
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Everything observable outside the engine, as text
    pub async fn observed_text(&self) -> String {
        let records = self.memory.records().await;
        let artifacts = self.memory.artifacts().await;
        format!(
            "{}\n{}\n{:?}",
            serde_json::to_string(&records).unwrap(),
            serde_json::to_string(&artifacts).unwrap(),
            self.events()
        )
    }
}

/// Every `end:<before>` comes before the first `start:<after>`
pub fn assert_finished_before(timeline: &[String], before: &str, after: &str) {
    let last_end = timeline
        .iter()
        .rposition(|e| *e == format!("end:{}", before))
        .unwrap_or_else(|| panic!("'{}' never ran", before));
    let first_start = timeline
        .iter()
        .position(|e| *e == format!("start:{}", after))
        .unwrap_or_else(|| panic!("'{}' never ran", after));
    assert!(
        last_end < first_start,
        "'{}' started before '{}' finished: {:?}",
        after,
        before,
        timeline
    );
}
