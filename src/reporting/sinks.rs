//! Built-in report sinks

use crate::reporting::{ArtifactRecord, OutcomeRecord, ReportSink};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

/// Writes records to the tracing log (`log`)
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl ReportSink for TracingSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn record(&self, record: &OutcomeRecord) -> Result<()> {
        match &record.reason {
            Some(reason) => info!(
                "[{}] job '{}' {}: {}",
                record.pipeline, record.job, record.outcome, reason
            ),
            None => info!("[{}] job '{}' {}", record.pipeline, record.job, record.outcome),
        }
        Ok(())
    }

    async fn forward(&self, artifact: &ArtifactRecord) -> Result<()> {
        info!(
            "[{}] {} artifact from {}/{}: {}",
            artifact.pipeline,
            artifact.artifact.kind,
            artifact.job,
            artifact.step,
            artifact.artifact.location
        );
        Ok(())
    }
}

/// Keeps everything in memory (`memory`)
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<OutcomeRecord>>,
    artifacts: Mutex<Vec<ArtifactRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<OutcomeRecord> {
        self.records.lock().await.clone()
    }

    pub async fn artifacts(&self) -> Vec<ArtifactRecord> {
        self.artifacts.lock().await.clone()
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn record(&self, record: &OutcomeRecord) -> Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn forward(&self, artifact: &ArtifactRecord) -> Result<()> {
        self.artifacts.lock().await.push(artifact.clone());
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Line<'a> {
    Outcome(&'a OutcomeRecord),
    Artifact(&'a ArtifactRecord),
}

/// Appends one JSON object per line to a file (`jsonl`)
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    /// Serializes appends so lines never interleave
    write_lock: Mutex<()>,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn append(&self, line: &Line<'_>) -> Result<()> {
        let mut json = serde_json::to_string(line)?;
        json.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl ReportSink for JsonLinesSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn record(&self, record: &OutcomeRecord) -> Result<()> {
        self.append(&Line::Outcome(record)).await
    }

    async fn forward(&self, artifact: &ArtifactRecord) -> Result<()> {
        self.append(&Line::Artifact(artifact)).await
    }
}
