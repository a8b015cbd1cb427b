//! Execution state models

use crate::collaborator::ArtifactRef;
use crate::core::trigger::RepositoryEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Overall status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Run has not started
    Pending,
    /// Jobs are being scheduled
    Running,
    /// No required job failed
    Succeeded,
    /// At least one required job failed
    Failed,
    /// The engine stopped the run on a scheduling invariant violation
    Aborted,
}

/// Outcome of a single job within one run
///
/// Transitions are monotonic: `Pending -> Running -> {Succeeded, Failed}`
/// or `Pending -> Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobOutcome {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl JobOutcome {
    /// Check if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobOutcome::Succeeded | JobOutcome::Failed | JobOutcome::Skipped
        )
    }

    /// Check whether `next` is a legal successor of this outcome
    pub fn can_transition_to(&self, next: JobOutcome) -> bool {
        matches!(
            (self, next),
            (JobOutcome::Pending, JobOutcome::Running)
                | (JobOutcome::Pending, JobOutcome::Skipped)
                | (JobOutcome::Running, JobOutcome::Succeeded)
                | (JobOutcome::Running, JobOutcome::Failed)
        )
    }

    /// Value exposed to conditions as `needs.<job>.result`
    pub fn result_str(&self) -> &'static str {
        match self {
            JobOutcome::Succeeded => "success",
            JobOutcome::Failed => "failure",
            JobOutcome::Skipped => "skipped",
            JobOutcome::Pending | JobOutcome::Running => "",
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobOutcome::Pending => "pending",
            JobOutcome::Running => "running",
            JobOutcome::Succeeded => "succeeded",
            JobOutcome::Failed => "failed",
            JobOutcome::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

/// Terminal report for one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub name: String,
    pub outcome: JobOutcome,
    /// Why the job failed or was skipped, with secrets redacted
    pub reason: Option<String>,
    /// Steps that failed under `continue-on-error`
    pub degraded_steps: Vec<String>,
    /// False when the job carries an override condition (`always()`, ...)
    pub required: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Result of running one pipeline for one event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub pipeline: String,
    pub event: RepositoryEvent,
    pub status: ExecutionStatus,
    /// Job reports in declaration order
    pub jobs: Vec<JobReport>,
    pub artifacts: Vec<ArtifactRef>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RunReport {
    /// Get the report of a job by name
    pub fn job(&self, name: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Get the outcome of a job by name
    pub fn outcome(&self, name: &str) -> Option<JobOutcome> {
        self.job(name).map(|j| j.outcome)
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }

    /// Count jobs that ended with the given outcome
    pub fn count(&self, outcome: JobOutcome) -> usize {
        self.jobs.iter().filter(|j| j.outcome == outcome).count()
    }

    /// Derive the run status from job reports
    pub fn status_from(jobs: &[JobReport]) -> ExecutionStatus {
        if jobs
            .iter()
            .any(|j| j.required && j.outcome == JobOutcome::Failed)
        {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Succeeded
        }
    }
}
