//! Action id to handler registry, resolved at load time

use crate::collaborator::{Collaborator, CommandAction, ShellTool};
use crate::core::error::DefinitionError;
use crate::core::pipeline::PipelineDefinition;
use crate::core::settings::EngineSettings;
use crate::core::step::StepKind;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Maps action ids to capability-typed handlers
#[derive(Clone)]
pub struct ActionRegistry {
    shell: Arc<dyn Collaborator>,
    actions: HashMap<String, Arc<dyn Collaborator>>,
}

impl ActionRegistry {
    /// Registry whose `run:` steps go to `shell`
    pub fn new(shell: Arc<dyn Collaborator>) -> Self {
        Self {
            shell,
            actions: HashMap::new(),
        }
    }

    /// Shell tool plus every action configured in the settings
    pub fn from_settings(settings: &EngineSettings) -> Self {
        let mut registry = Self::new(Arc::new(ShellTool::new(settings.shell.clone())));
        for (id, action) in &settings.actions {
            registry.register(
                id.clone(),
                Arc::new(CommandAction::from_settings(action, &settings.shell)),
            );
        }
        registry
    }

    pub fn register(&mut self, id: impl Into<String>, handler: Arc<dyn Collaborator>) {
        self.actions.insert(id.into(), handler);
    }

    pub fn with_action(mut self, id: impl Into<String>, handler: Arc<dyn Collaborator>) -> Self {
        self.register(id, handler);
        self
    }

    /// Handler for `run:` steps
    pub fn shell(&self) -> Arc<dyn Collaborator> {
        self.shell.clone()
    }

    /// Exact id first, then the id without its `@version`
    pub fn lookup(&self, id: &str) -> Option<Arc<dyn Collaborator>> {
        self.actions.get(id).cloned().or_else(|| {
            id.split_once('@')
                .and_then(|(base, _)| self.actions.get(base).cloned())
        })
    }

    /// Resolve every step of the definition to a handler
    pub fn bind(&self, definition: &PipelineDefinition) -> Result<BoundActions, DefinitionError> {
        let handlers = definition
            .jobs
            .iter()
            .map(|job| {
                job.steps
                    .iter()
                    .map(|step| match &step.kind {
                        StepKind::Run { .. } => Ok(self.shell()),
                        StepKind::Action { id, .. } => {
                            self.lookup(id).ok_or_else(|| DefinitionError::UnknownAction {
                                job: job.name.clone(),
                                step: step.name.clone(),
                                action: id.clone(),
                            })
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BoundActions { handlers })
    }

    /// Registered action ids, sorted
    pub fn action_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.action_ids())
            .finish()
    }
}

/// Handlers per `[job][step]`, in declaration order
#[derive(Clone)]
pub struct BoundActions {
    handlers: Vec<Vec<Arc<dyn Collaborator>>>,
}

impl BoundActions {
    pub fn handler(&self, job: usize, step: usize) -> Option<&Arc<dyn Collaborator>> {
        self.handlers.get(job).and_then(|steps| steps.get(step))
    }

    /// Handlers of one job's steps
    pub fn job(&self, job: usize) -> &[Arc<dyn Collaborator>] {
        self.handlers.get(job).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl fmt::Debug for BoundActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<usize> = self.handlers.iter().map(Vec::len).collect();
        f.debug_struct("BoundActions").field("steps", &counts).finish()
    }
}
