use anyhow::{Context, Result};
use gantry::cli::commands::{HistoryCommand, MatchCommand, RunCommand, ValidateCommand};
use gantry::cli::output::*;
use gantry::cli::{Cli, Command};
use gantry::collaborator::ActionRegistry;
use gantry::core::{EngineSettings, ExecutionStatus, PipelineDefinition, RunReport};
use gantry::execution::{EventMatcher, ExecutionEngine, ExecutionEvent, PreparedPipeline};
use gantry::persistence::{create_summary, HistoryBackend, RunSummary};
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // RUST_LOG wins over -v
    let default_level = if cli.verbose { "gantry=debug" } else { "gantry=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let settings = EngineSettings::load(cli.settings.as_deref()).context("Failed to load settings")?;

    match &cli.command {
        Command::Run(cmd) => run_pipelines(cmd, settings).await?,
        Command::Validate(cmd) => validate_pipeline(cmd, &settings)?,
        Command::Match(cmd) => match_pipelines(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

async fn run_pipelines(cmd: &RunCommand, mut settings: EngineSettings) -> Result<()> {
    // Files given on the command line are searched first
    let mut files = cmd.secrets_file.clone();
    files.append(&mut settings.secrets.files);
    settings.secrets.files = files;

    let mut engine = ExecutionEngine::from_settings(&settings)?;
    if let Some(strategy) = cmd.strategy {
        engine = engine.with_strategy(strategy.to_strategy(cmd.max_parallel));
    }

    let pipelines = cmd
        .files
        .iter()
        .map(|file| {
            engine
                .load_file(file)
                .with_context(|| format!("Failed to load pipeline {}", file.display()))
        })
        .collect::<Result<Vec<PreparedPipeline>>>()?;

    let event = cmd.event.to_event();
    let selected = engine.dispatch(&pipelines, &event);
    if selected.is_empty() {
        println!("{}No pipeline is triggered by this {} event", WARN, event.kind);
        return Ok(());
    }

    let total_jobs: usize = selected.iter().map(|p| p.definition.jobs.len()).sum();
    let progress = create_progress_bar(total_jobs);
    let bar = progress.clone();
    engine.add_event_handler(move |event| {
        if let ExecutionEvent::JobFinished { job, .. } = &event {
            bar.inc(1);
            bar.set_message(job.clone());
        }
        bar.println(format_execution_event(&event));
    });

    let history = open_history(cmd.no_history || !settings.reporting.history).await?;

    let mut reports: Vec<RunReport> = Vec::new();
    let mut aborted = Vec::new();
    for pipeline in selected {
        match engine.execute(pipeline, &event).await {
            Ok(report) => {
                if let Some(history) = &history {
                    if let Err(e) = history.save_run(&create_summary(&report)).await {
                        warn!("Failed to save run {} to history: {:#}", report.run_id, e);
                    }
                }
                reports.push(report);
            }
            Err(e) => {
                error!("{}", e);
                aborted.push(pipeline.name().to_string());
            }
        }
    }
    progress.finish_and_clear();

    println!("{}", style(separator()).dim());
    for report in &reports {
        let icon = if report.is_success() { CHECK } else { CROSS };
        let duration = (report.completed_at - report.started_at)
            .to_std()
            .unwrap_or_default();
        println!(
            "{}{} {} in {}",
            icon,
            style(&report.pipeline).bold(),
            format_status(report.status),
            format_duration(duration)
        );
        println!("{}", format_run_report(report));
    }
    for name in &aborted {
        println!(
            "{}{} {}",
            CROSS,
            style(name).bold(),
            format_status(ExecutionStatus::Aborted)
        );
    }

    if !aborted.is_empty() || reports.iter().any(|r| !r.is_success()) {
        std::process::exit(1);
    }
    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand, settings: &EngineSettings) -> Result<()> {
    println!("{}Validating pipeline...", INFO);

    let result = PipelineDefinition::from_file(&cmd.file).and_then(|definition| {
        ActionRegistry::from_settings(settings)
            .bind(&definition)
            .map(|_| definition)
    });

    match result {
        Ok(definition) => {
            println!("{}Pipeline definition is valid!", CHECK);
            println!("  Name: {}", style(&definition.name).bold());
            println!(
                "  Triggers: {}",
                style(
                    definition
                        .triggers
                        .iter()
                        .map(|t| t.kind.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
                .cyan()
            );
            println!("  Jobs: {}", style(definition.jobs.len()).cyan());
            println!(
                "  Order: {}",
                definition.graph.topological_order().join(" -> ")
            );

            let secrets = definition.referenced_secrets();
            if !secrets.is_empty() {
                println!(
                    "  Secrets: {}",
                    secrets.iter().cloned().collect::<Vec<_>>().join(", ")
                );
            }

            if cmd.json {
                let jobs: Vec<_> = definition
                    .jobs
                    .iter()
                    .map(|job| {
                        serde_json::json!({
                            "name": job.name,
                            "needs": job.needs,
                            "condition": job.condition.as_ref().map(|c| c.source().to_string()),
                            "required": job.is_required(),
                            "steps": job.steps.iter().map(|s| s.name.clone()).collect::<Vec<_>>(),
                            "secrets": definition.job_secrets(job),
                        })
                    })
                    .collect();
                let data = serde_json::json!({
                    "name": definition.name,
                    "triggers": definition.triggers.iter().map(|t| t.kind).collect::<Vec<_>>(),
                    "order": definition.graph.topological_order(),
                    "jobs": jobs,
                });
                println!("\n{}", serde_json::to_string_pretty(&data)?);
            }
            Ok(())
        }
        Err(e) => {
            println!("{}Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}

fn match_pipelines(cmd: &MatchCommand) -> Result<()> {
    let definitions = cmd
        .files
        .iter()
        .map(|file| {
            PipelineDefinition::from_file(file)
                .with_context(|| format!("Failed to load pipeline {}", file.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let event = cmd.event.to_event();
    let selected = EventMatcher::select(&definitions, &event);
    if selected.is_empty() {
        println!("{}No pipeline is triggered by this {} event", INFO, event.kind);
        return Ok(());
    }

    println!("{}Pipelines triggered by this {} event:", ROCKET, event.kind);
    for (file, definition) in cmd.files.iter().zip(&definitions) {
        if selected.iter().any(|s| std::ptr::eq(*s, definition)) {
            println!(
                "  {} {}",
                style(&definition.name).bold(),
                style(file.display()).dim()
            );
        }
    }
    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let Some(store) = open_history(false).await? else {
        return Ok(());
    };

    if cmd.pipelines {
        let pipelines = store.list_pipelines().await?;
        if cmd.json {
            let data = serde_json::json!({ "pipelines": pipelines });
            println!("{}", serde_json::to_string_pretty(&data)?);
        } else if pipelines.is_empty() {
            println!("{}No runs recorded yet", INFO);
        } else {
            println!("{}Pipelines with recorded runs:", INFO);
            println!("{}", format_pipeline_list(&pipelines));
        }
        return Ok(());
    }

    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) if cmd.json => println!("{}", serde_json::to_string_pretty(&summary)?),
            Some(summary) => print_run_details(&summary),
            None => println!("{}Run not found", WARN),
        }
        return Ok(());
    }

    let runs = match &cmd.pipeline {
        Some(pipeline) => store.list_runs(pipeline, cmd.limit).await?,
        None => store.recent_runs(cmd.limit).await?,
    };

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("{}No runs found", INFO);
        return Ok(());
    }

    println!("{}Run history (latest {}):", INFO, cmd.limit);
    for summary in &runs {
        println!("  {}", format_run_summary(summary));
    }
    Ok(())
}

fn print_run_details(summary: &RunSummary) {
    println!("{}Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline).bold());
    println!("  Status: {}", format_status(summary.status));
    println!(
        "  Event: {}{}",
        summary.event_kind,
        summary
            .git_ref
            .as_deref()
            .map(|r| format!(" ({})", r))
            .unwrap_or_default()
    );
    println!(
        "  Jobs: {} succeeded, {} failed, {} skipped",
        style(summary.jobs_succeeded).green(),
        style(summary.jobs_failed).red(),
        style(summary.jobs_skipped).dim()
    );
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    println!("  Completed: {}", style(summary.completed_at.to_rfc3339()).dim());
    if let Ok(duration) = summary.duration().to_std() {
        println!("  Duration: {}", style(format_duration(duration)).dim());
    }
}

/// The history store, or `None` when history is turned off
async fn open_history(disabled: bool) -> Result<Option<Arc<dyn HistoryBackend>>> {
    if disabled {
        return Ok(None);
    }
    open_store().await.map(Some)
}

#[cfg(feature = "sqlite")]
async fn open_store() -> Result<Arc<dyn HistoryBackend>> {
    let store = gantry::persistence::SqliteHistoryStore::with_default_path()
        .await
        .context("Failed to open history database")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_store() -> Result<Arc<dyn HistoryBackend>> {
    warn!("Built without the sqlite feature; history is kept in memory only");
    Ok(Arc::new(gantry::persistence::InMemoryHistory::new()))
}

