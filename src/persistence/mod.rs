//! Run history
//!
//! One [`RunSummary`] row per finished run. Summaries carry names, counts
//! and timestamps only; step output and secrets never reach this layer.

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteHistoryStore;

use crate::core::state::{ExecutionStatus, JobOutcome, RunReport};
use crate::core::trigger::EventKind;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub pipeline: String,
    pub status: ExecutionStatus,

    pub event_kind: EventKind,
    /// `refs/heads/...` or `refs/tags/...`, when the event had one
    pub git_ref: Option<String>,

    pub jobs_succeeded: usize,
    pub jobs_failed: usize,
    pub jobs_skipped: usize,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn total_jobs(&self) -> usize {
        self.jobs_succeeded + self.jobs_failed + self.jobs_skipped
    }

    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}

/// Trait for history backends
#[async_trait::async_trait]
pub trait HistoryBackend: Send + Sync {
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// Runs of one pipeline, newest first
    async fn list_runs(&self, pipeline: &str, limit: usize) -> Result<Vec<RunSummary>>;

    /// Runs of every pipeline, newest first
    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunSummary>>;

    /// Pipeline names with at least one saved run, sorted
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory history (for testing or ephemeral use)
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    runs: RwLock<HashMap<Uuid, RunSummary>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    async fn newest_first<F>(&self, limit: usize, keep: F) -> Vec<RunSummary>
    where
        F: Fn(&RunSummary) -> bool,
    {
        let runs = self.runs.read().await;
        let mut selected: Vec<RunSummary> = runs.values().filter(|r| keep(r)).cloned().collect();
        selected.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        selected.truncate(limit);
        selected
    }
}

#[async_trait::async_trait]
impl HistoryBackend for InMemoryHistory {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        self.runs.write().await.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn list_runs(&self, pipeline: &str, limit: usize) -> Result<Vec<RunSummary>> {
        Ok(self.newest_first(limit, |r| r.pipeline == pipeline).await)
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunSummary>> {
        Ok(self.newest_first(limit, |_| true).await)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|r| r.pipeline.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a finished run
pub fn create_summary(report: &RunReport) -> RunSummary {
    RunSummary {
        run_id: report.run_id,
        pipeline: report.pipeline.clone(),
        status: report.status,
        event_kind: report.event.kind,
        git_ref: report.event.git_ref(),
        jobs_succeeded: report.count(JobOutcome::Succeeded),
        jobs_failed: report.count(JobOutcome::Failed),
        jobs_skipped: report.count(JobOutcome::Skipped),
        started_at: report.started_at,
        completed_at: report.completed_at,
    }
}
