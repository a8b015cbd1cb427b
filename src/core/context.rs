//! Per-run execution context and the shared outcome map

use crate::core::error::SchedulingError;
use crate::core::state::JobOutcome;
use crate::core::trigger::RepositoryEvent;
use crate::secrets::{Redactor, RunSecrets};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Job outcomes of one run, one slot per job
///
/// Each slot is a `watch` channel: a transition locks only that slot, and
/// a reader that waits on it observes the completed write.
#[derive(Debug)]
pub struct OutcomeMap {
    names: Vec<String>,
    index: HashMap<String, usize>,
    slots: Vec<watch::Sender<JobOutcome>>,
}

impl OutcomeMap {
    /// All jobs start `Pending`
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        let slots = names
            .iter()
            .map(|_| watch::channel(JobOutcome::Pending).0)
            .collect();
        Self {
            names,
            index,
            slots,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    fn slot(&self, index: usize) -> Result<&watch::Sender<JobOutcome>, SchedulingError> {
        self.slots
            .get(index)
            .ok_or_else(|| SchedulingError::UnknownJob(format!("#{}", index)))
    }

    /// Current outcome of a job
    pub fn get(&self, index: usize) -> Result<JobOutcome, SchedulingError> {
        Ok(*self.slot(index)?.borrow())
    }

    /// Atomically move a job to `to`; illegal moves are invariant violations
    pub fn transition(&self, index: usize, to: JobOutcome) -> Result<(), SchedulingError> {
        let slot = self.slot(index)?;
        let mut rejected = None;
        slot.send_if_modified(|current| {
            if current.can_transition_to(to) {
                *current = to;
                true
            } else {
                rejected = Some(*current);
                false
            }
        });

        match rejected {
            None => Ok(()),
            Some(from) => Err(SchedulingError::InvariantViolation {
                job: self.names[index].clone(),
                from,
                to,
            }),
        }
    }

    /// Wait until a job is terminal and return its outcome
    pub async fn wait_terminal(&self, index: usize) -> Result<JobOutcome, SchedulingError> {
        let mut rx = self.slot(index)?.subscribe();
        let outcome = rx
            .wait_for(JobOutcome::is_terminal)
            .await
            .map(|o| *o)
            .map_err(|_| SchedulingError::DependencyLost(self.names[index].clone()))?;
        Ok(outcome)
    }

    /// Name/outcome pairs in declaration order
    pub fn snapshot(&self) -> Vec<(String, JobOutcome)> {
        self.names
            .iter()
            .zip(&self.slots)
            .map(|(n, s)| (n.clone(), *s.borrow()))
            .collect()
    }
}

/// State owned by one pipeline run; dropped, with its secrets, at run end
#[derive(Debug)]
pub struct ExecutionContext {
    pub run_id: Uuid,
    pub event: RepositoryEvent,
    pub outcomes: OutcomeMap,
    pub secrets: Arc<RunSecrets>,
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new<I, S>(event: RepositoryEvent, jobs: I, secrets: Arc<RunSecrets>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            run_id: Uuid::new_v4(),
            event,
            outcomes: OutcomeMap::new(jobs),
            secrets,
            started_at: Utc::now(),
        }
    }

    /// Outcomes of the given jobs, keyed by name
    pub fn outcomes_of(&self, indices: &[usize]) -> Result<BTreeMap<String, JobOutcome>, SchedulingError> {
        indices
            .iter()
            .map(|&i| Ok((self.outcomes.name(i).to_string(), self.outcomes.get(i)?)))
            .collect()
    }

    pub fn redactor(&self) -> &Redactor {
        self.secrets.redactor()
    }
}
