//! CLI output formatting

use crate::core::state::{ExecutionStatus, JobOutcome, RunReport};
use crate::execution::ExecutionEvent;
use crate::persistence::RunSummary;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "* ");

/// Progress bar counting finished jobs
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(bar) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(bar.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Horizontal rule as wide as the terminal
pub fn separator() -> String {
    let width = term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80);
    "─".repeat(width)
}

pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Aborted => style("ABORTED").red().bold().to_string(),
    }
}

pub fn format_outcome(outcome: JobOutcome) -> String {
    match outcome {
        JobOutcome::Pending => style("pending").dim().to_string(),
        JobOutcome::Running => style("running").yellow().to_string(),
        JobOutcome::Succeeded => style("succeeded").green().to_string(),
        JobOutcome::Failed => style("failed").red().to_string(),
        JobOutcome::Skipped => style("skipped").dim().to_string(),
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// One history row
pub fn format_run_summary(summary: &RunSummary) -> String {
    let icon = match summary.status {
        ExecutionStatus::Succeeded => CHECK,
        ExecutionStatus::Failed | ExecutionStatus::Aborted => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Pending => INFO,
    };

    format!(
        "{}{} - {} - {} on {}{} - {}/{}/{} succeeded/failed/skipped - {}",
        icon,
        style(short_id(&summary.run_id)).dim(),
        style(&summary.pipeline).bold(),
        format_status(summary.status),
        summary.event_kind,
        summary
            .git_ref
            .as_deref()
            .map(|r| format!(" {}", r))
            .unwrap_or_default(),
        style(summary.jobs_succeeded).green(),
        style(summary.jobs_failed).red(),
        style(summary.jobs_skipped).dim(),
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    )
}

/// Pipelines with recorded runs, one per line
pub fn format_pipeline_list(pipelines: &[String]) -> String {
    pipelines
        .iter()
        .map(|name| format!("  {}{}", PACKAGE, style(name).bold()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Job table printed after a run
pub fn format_run_report(report: &RunReport) -> String {
    let mut lines = Vec::with_capacity(report.jobs.len() + 1);
    for job in &report.jobs {
        let mut line = format!("  {:<24} {}", job.name, format_outcome(job.outcome));
        if !job.required {
            line.push_str(&style(" (override)").dim().to_string());
        }
        if let Some(reason) = &job.reason {
            line.push_str(&format!(" - {}", style(reason).dim()));
        }
        if !job.degraded_steps.is_empty() {
            line.push_str(&format!(
                " {}degraded: {}",
                WARN,
                job.degraded_steps.join(", ")
            ));
        }
        lines.push(line);
    }
    for artifact in &report.artifacts {
        lines.push(format!(
            "  {}{} {}",
            PACKAGE,
            style(&artifact.kind).cyan(),
            artifact.location
        ));
    }
    lines.join("\n")
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            run_id,
            pipeline,
            event,
            jobs,
        } => format!(
            "{}Starting {} ({}) for {} event, {} jobs",
            ROCKET,
            style(pipeline).bold(),
            style(short_id(run_id)).dim(),
            event.kind,
            jobs
        ),
        ExecutionEvent::JobStarted { job } => {
            format!("{}{}", SPINNER, style(job).cyan())
        }
        ExecutionEvent::JobSkipped { job, reason } => {
            format!("{}{} {}", SKIP, style(job).dim(), style(reason).dim())
        }
        ExecutionEvent::StepStarted { job, step, index } => format!(
            "   {} {}. {}",
            style(job).dim(),
            index + 1,
            step
        ),
        ExecutionEvent::StepOutput { job, step, output } => format!(
            "{}Output from {}/{}:\n{}",
            INFO,
            style(job).dim(),
            style(step).dim(),
            format_output(output, 10)
        ),
        ExecutionEvent::StepFinished { job, step } => {
            format!("   {} {}{}", style(job).dim(), CHECK, step)
        }
        ExecutionEvent::StepDegraded { job, step, error } => format!(
            "   {} {}{} (continuing): {}",
            style(job).dim(),
            WARN,
            style(step).yellow(),
            style(error).dim()
        ),
        ExecutionEvent::StepFailed { job, step, error } => format!(
            "   {} {}{}: {}",
            style(job).dim(),
            CROSS,
            style(step).red(),
            style(error).dim()
        ),
        ExecutionEvent::ArtifactForwarded {
            job,
            artifact,
            sink,
            ..
        } => format!(
            "{}{} {} from {} -> {}",
            PACKAGE,
            style(&artifact.kind).cyan(),
            artifact.location,
            style(job).dim(),
            sink
        ),
        ExecutionEvent::JobFinished {
            job,
            outcome,
            reason,
        } => {
            let icon = match outcome {
                JobOutcome::Succeeded => CHECK,
                JobOutcome::Skipped => SKIP,
                _ => CROSS,
            };
            match reason {
                Some(reason) if *outcome != JobOutcome::Skipped => format!(
                    "{}{} {}: {}",
                    icon,
                    style(job).bold(),
                    format_outcome(*outcome),
                    style(reason).dim()
                ),
                _ => format!("{}{} {}", icon, style(job).bold(), format_outcome(*outcome)),
            }
        }
        ExecutionEvent::RunCompleted {
            run_id,
            pipeline,
            status,
        } => format!(
            "{}{} ({}) {}",
            INFO,
            style(pipeline).bold(),
            style(short_id(run_id)).dim(),
            format_status(*status)
        ),
    }
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
