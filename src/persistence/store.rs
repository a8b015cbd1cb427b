//! SQLite-based history store

use crate::core::state::ExecutionStatus;
use crate::core::trigger::EventKind;
use crate::persistence::{HistoryBackend, RunSummary};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

const COLUMNS: &str = "id, pipeline, status, event_kind, git_ref, jobs_succeeded, jobs_failed, \
                       jobs_skipped, started_at, completed_at";

/// SQLite run history
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Open (or create) the database at `db_path`; `:memory:` is accepted
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))
            .context("Invalid database path")?
            .create_if_missing(true);
        // One connection keeps an in-memory database alive and shared
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to connect to history database")?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Store under the user's local data directory
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("gantry");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;
        Self::at(&db_dir.join("history.db")).await
    }

    pub async fn at(path: &Path) -> Result<Self> {
        let path = path
            .to_str()
            .with_context(|| format!("Non UTF-8 database path {}", path.display()))?;
        Self::new(path).await
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                pipeline TEXT NOT NULL,
                status TEXT NOT NULL,
                event_kind TEXT NOT NULL,
                git_ref TEXT,
                jobs_succeeded INTEGER NOT NULL DEFAULT 0,
                jobs_failed INTEGER NOT NULL DEFAULT 0,
                jobs_skipped INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                completed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_runs_pipeline ON runs(pipeline);
            CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize history schema")?;
        Ok(())
    }

    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn parse_status(status: &str) -> Result<ExecutionStatus> {
        Ok(match status {
            "Pending" => ExecutionStatus::Pending,
            "Running" => ExecutionStatus::Running,
            "Succeeded" => ExecutionStatus::Succeeded,
            "Failed" => ExecutionStatus::Failed,
            "Aborted" => ExecutionStatus::Aborted,
            other => anyhow::bail!("Unknown run status '{}' in history", other),
        })
    }

    fn from_row(row: &SqliteRow) -> Result<RunSummary> {
        Ok(RunSummary {
            run_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            pipeline: row.get("pipeline"),
            status: Self::parse_status(&row.get::<String, _>("status"))?,
            event_kind: EventKind::from_str(&row.get::<String, _>("event_kind"))?,
            git_ref: row.get("git_ref"),
            jobs_succeeded: row.get::<i64, _>("jobs_succeeded") as usize,
            jobs_failed: row.get::<i64, _>("jobs_failed") as usize,
            jobs_skipped: row.get::<i64, _>("jobs_skipped") as usize,
            started_at: Self::from_naive(row.get("started_at")),
            completed_at: Self::from_naive(row.get("completed_at")),
        })
    }
}

#[async_trait::async_trait]
impl HistoryBackend for SqliteHistoryStore {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, pipeline, status, event_kind, git_ref, jobs_succeeded, jobs_failed, jobs_skipped, started_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(run.run_id.to_string())
        .bind(&run.pipeline)
        .bind(format!("{:?}", run.status))
        .bind(run.event_kind.as_str())
        .bind(run.git_ref.as_deref())
        .bind(run.jobs_succeeded as i64)
        .bind(run.jobs_failed as i64)
        .bind(run.jobs_skipped as i64)
        .bind(Self::to_naive(run.started_at))
        .bind(Self::to_naive(run.completed_at))
        .execute(&self.pool)
        .await
        .context("Failed to save run")?;
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let row = sqlx::query(&format!("SELECT {} FROM runs WHERE id = ?1", COLUMNS))
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load run")?;
        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_runs(&self, pipeline: &str, limit: usize) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM runs WHERE pipeline = ?1 ORDER BY started_at DESC LIMIT ?2",
            COLUMNS
        ))
        .bind(pipeline)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM runs ORDER BY started_at DESC LIMIT ?1",
            COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list recent runs")?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT pipeline FROM runs ORDER BY pipeline ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list pipelines")?;
        Ok(rows.iter().map(|row| row.get("pipeline")).collect())
    }
}
