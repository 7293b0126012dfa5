//! CLI output formatting

use crate::{
    core::{ExecutionStatus, RunConfig, StageRecord, StageResult},
    execution::{ExecutionEvent, PlannedStage, StageGate},
    persistence::ExecutionSummary,
};
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
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Progress bar for the model data fetch
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

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::CompletedWithFailures => {
            style("COMPLETED WITH FAILURES").yellow().to_string()
        }
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format a stage result for display
pub fn format_stage_result(result: StageResult) -> String {
    match result {
        StageResult::Success => style(result).green().to_string(),
        StageResult::Skipped => style(result).dim().to_string(),
        StageResult::Failed | StageResult::TimedOut => style(result).red().to_string(),
    }
}

/// Format execution summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::CompletedWithFailures => WARN,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Pending => INFO,
    };
    let passed = summary
        .stages
        .iter()
        .filter(|r| r.result.is_passing())
        .count();

    format!(
        "{} {} - {} - {} ({}/{} stages passed) - {}",
        status_icon,
        style(short_id(summary)).dim(),
        style(&summary.run_name).bold(),
        format_status(summary.status),
        passed,
        summary.stages.len(),
        style(summary.started_at.format("%Y-%m-%d %H:%M")).dim()
    )
}

fn short_id(summary: &ExecutionSummary) -> String {
    summary.execution_id.to_string().chars().take(8).collect()
}

/// One line per recorded stage
pub fn format_stage_report(records: &[StageRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            let elapsed = (record.finished_at - record.started_at)
                .to_std()
                .map(format_duration)
                .unwrap_or_default();
            let mut line = format!(
                "{:<8} {:<10} {}",
                record.stage,
                format_stage_result(record.result),
                style(elapsed).dim()
            );
            if let Some(detail) = &record.detail {
                line.push_str(&format!("  {}", style(detail).dim()));
            }
            line
        })
        .collect()
}

/// The stage plan as `validate` shows it
pub fn format_stage_plan(stages: &[PlannedStage]) -> Vec<String> {
    stages
        .iter()
        .map(|planned| {
            let gate = match &planned.gate {
                StageGate::Always => "mandatory".to_string(),
                StageGate::Flag { name, enabled: true } => format!("{} = 1", name),
                StageGate::Flag {
                    name,
                    enabled: false,
                } => format!("{} = 0, skipped", name),
                StageGate::Delegated { reason } => reason.clone(),
            };
            format!(
                "{:<8} {} ({:?}) - {}",
                style(&planned.spec.name).cyan(),
                planned.spec.job_script.display(),
                planned.policy,
                style(gate).dim()
            )
        })
        .collect()
}

/// Derived paths shown by `validate`
pub fn format_run_paths(config: &RunConfig) -> Vec<String> {
    vec![
        format!("Run: {}", style(config.run_name()).bold()),
        format!(
            "Period: {} to {}",
            config.start_time.format("%Y-%m-%d %H:%M"),
            config.end_time().format("%Y-%m-%d %H:%M")
        ),
        format!("Run directory: {}", config.run_dir().display()),
        format!("Output directory: {}", config.output_dir().display()),
        format!("Post-processing directory: {}", config.post_dir().display()),
        format!("Model data: {}", config.model_data_dir().display()),
        format!("Debug mode: {}", config.debug_mode),
    ]
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            run_name,
            total_stages,
        } => format!(
            "{} Starting run {} with {} stage(s) ({})",
            ROCKET,
            style(run_name).bold(),
            total_stages,
            style(&execution_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::StageStarted { stage, index } => {
            format!("{} [{}] {}", SPINNER, index + 1, style(stage).cyan())
        }
        ExecutionEvent::StageSkipped { stage, reason } => {
            format!("{} {} ({})", SKIP, style(stage).dim(), reason)
        }
        ExecutionEvent::StageCompleted { stage, detail } => match detail {
            Some(detail) => format!("{} {} ({})", CHECK, style(stage).green(), style(detail).dim()),
            None => format!("{} {}", CHECK, style(stage).green()),
        },
        ExecutionEvent::StageFailed {
            stage,
            result,
            detail,
            fatal,
        } => {
            let icon = if *fatal { CROSS } else { WARN };
            let mut line = format!(
                "{} {}: {}",
                icon,
                style(stage).red(),
                format_stage_result(*result)
            );
            if let Some(detail) = detail {
                line.push_str(&format!(" {}", style(detail).dim()));
            }
            if !*fatal {
                line.push_str(&format!(" {}", style("(continuing)").yellow()));
            }
            line
        }
        ExecutionEvent::CleanupStarted { profile } => {
            format!("{} Cleaning up ({} profile)", INFO, style(profile).dim())
        }
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        } => format!(
            "{} Run ({}) {}",
            INFO,
            style(&execution_id.to_string()[..8]).dim(),
            format_status(*status)
        ),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
