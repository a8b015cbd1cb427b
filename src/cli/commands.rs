//! CLI command definitions

use crate::core::trigger::{EventKind, RepositoryEvent};
use crate::execution::SchedulingStrategy;
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;

/// The repository event to simulate
#[derive(Debug, Args, Clone)]
pub struct EventArgs {
    /// Event kind (push, release, pull_request, workflow_dispatch)
    #[arg(short, long, value_parser = parse_event_kind)]
    pub event: EventKind,

    /// Branch the event refers to
    #[arg(long)]
    pub branch: Option<String>,

    /// Tag the event refers to
    #[arg(long)]
    pub tag: Option<String>,

    /// Event action, e.g. `published` for a release
    #[arg(long)]
    pub action: Option<String>,
}

impl EventArgs {
    pub fn to_event(&self) -> RepositoryEvent {
        let mut event = RepositoryEvent::new(self.event);
        if let Some(branch) = &self.branch {
            event = event.with_branch(branch.clone());
        }
        if let Some(tag) = &self.tag {
            event = event.with_tag(tag.clone());
        }
        if let Some(action) = &self.action {
            event = event.with_action(action.clone());
        }
        event
    }
}

/// Run the pipelines an event activates
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Pipeline YAML files
    #[arg(short, long = "file", required = true)]
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub event: EventArgs,

    /// Extra dotenv-style secrets files, searched before the environment
    #[arg(long)]
    pub secrets_file: Vec<PathBuf>,

    /// Scheduling strategy (overrides settings)
    #[arg(long, value_enum)]
    pub strategy: Option<SchedulingStrategyArg>,

    /// Job limit for `parallel-limited`
    #[arg(long, default_value_t = 4)]
    pub max_parallel: usize,

    /// Don't save runs to history
    #[arg(long)]
    pub no_history: bool,
}

/// Validate a pipeline definition
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List the pipelines an event would activate
#[derive(Debug, Args, Clone)]
pub struct MatchCommand {
    /// Pipeline YAML files
    #[arg(short, long = "file", required = true)]
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub event: EventArgs,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show a single run
    #[arg(long)]
    pub run_id: Option<String>,

    /// List the pipelines that have recorded runs
    #[arg(long, conflicts_with_all = ["pipeline", "run_id"])]
    pub pipelines: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

impl SchedulingStrategyArg {
    pub fn to_strategy(self, max_parallel: usize) -> SchedulingStrategy {
        match self {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => SchedulingStrategy::LimitedParallel(max_parallel),
        }
    }
}

fn parse_event_kind(s: &str) -> Result<EventKind, String> {
    EventKind::from_str(s).map_err(|e| e.to_string())
}
