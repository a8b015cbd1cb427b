//! Outcome reporting and artifact forwarding
//!
//! The [`Reporter`] is purely observational: it fans job records out to
//! every sink and forwards artifact handles to one routed sink. Sink
//! failures are logged and never reach the scheduler.

pub mod sinks;

pub use sinks::{JsonLinesSink, MemorySink, TracingSink};

use crate::collaborator::ArtifactRef;
use crate::core::settings::ReportingSettings;
use crate::core::state::JobOutcome;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Terminal record of one job. Reasons are redacted before they get here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub run_id: Uuid,
    pub pipeline: String,
    pub job: String,
    pub outcome: JobOutcome,
    pub reason: Option<String>,
    /// Steps that failed under `continue-on-error`
    pub degraded_steps: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

/// An artifact handle plus where it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub run_id: Uuid,
    pub pipeline: String,
    pub job: String,
    pub step: String,
    pub artifact: ArtifactRef,
}

/// Destination for records and artifacts
///
/// Calls arrive concurrently and in no particular order across jobs.
#[async_trait]
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &str;

    async fn record(&self, record: &OutcomeRecord) -> Result<()>;

    async fn forward(&self, artifact: &ArtifactRecord) -> Result<()>;
}

/// Fans records out to sinks and routes artifacts
#[derive(Clone)]
pub struct Reporter {
    /// Registration order
    sinks: Vec<Arc<dyn ReportSink>>,
    default_sink: String,
    /// Artifact kind to sink name
    routes: HashMap<String, String>,
}

impl Reporter {
    pub fn new(default_sink: impl Into<String>) -> Self {
        Self {
            sinks: Vec::new(),
            default_sink: default_sink.into(),
            routes: HashMap::new(),
        }
    }

    /// Tracing sink, plus the JSON-lines sink when configured
    pub fn from_settings(settings: &ReportingSettings) -> Self {
        let mut reporter = Self::new(settings.default_sink.clone()).with_sink(Arc::new(TracingSink));
        if let Some(path) = &settings.jsonl {
            reporter = reporter.with_sink(Arc::new(JsonLinesSink::new(path.clone())));
        }
        for (kind, sink) in &settings.routes {
            reporter = reporter.with_route(kind.clone(), sink.clone());
        }
        reporter
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_route(mut self, kind: impl Into<String>, sink: impl Into<String>) -> Self {
        self.routes.insert(kind.into(), sink.into());
        self
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Record a job's terminal outcome with every sink
    pub async fn record(&self, record: &OutcomeRecord) {
        for sink in &self.sinks {
            if let Err(e) = sink.record(record).await {
                warn!(
                    "Sink '{}' failed to record job '{}': {:#}",
                    sink.name(),
                    record.job,
                    e
                );
            }
        }
    }

    /// Forward an artifact to one named sink
    pub async fn forward(&self, artifact: &ArtifactRecord, sink: &str) {
        let Some(target) = self.sinks.iter().find(|s| s.name() == sink) else {
            warn!(
                "No sink named '{}' for {} artifact {}",
                sink, artifact.artifact.kind, artifact.artifact.location
            );
            return;
        };
        if let Err(e) = target.forward(artifact).await {
            warn!(
                "Sink '{}' failed to accept artifact {}: {:#}",
                sink, artifact.artifact.location, e
            );
        }
    }

    /// Artifact's own sink, then the route for its kind, then the default
    pub fn route<'a>(&'a self, artifact: &'a ArtifactRef) -> &'a str {
        artifact
            .sink
            .as_deref()
            .or_else(|| self.routes.get(&artifact.kind).map(String::as_str))
            .unwrap_or(&self.default_sink)
    }

    /// Forward to the routed sink; returns the sink name used
    pub async fn forward_routed(&self, artifact: &ArtifactRecord) -> String {
        let sink = self.route(&artifact.artifact).to_string();
        self.forward(artifact, &sink).await;
        sink
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new("log").with_sink(Arc::new(TracingSink))
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("sinks", &self.sink_names())
            .field("default_sink", &self.default_sink)
            .field("routes", &self.routes)
            .finish()
    }
}
