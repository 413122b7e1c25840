//! CLI output formatting

use crate::{
    core::{ExecutionStatus, Job, StepState},
    execution::ExecutionEvent,
    persistence::{BuildSummary, JobSummary},
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
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a progress bar
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Icon for a status
pub fn status_icon(status: ExecutionStatus) -> &'static Emoji<'static, 'static> {
    match status {
        ExecutionStatus::Passed => &CHECK,
        ExecutionStatus::Failed | ExecutionStatus::Errored => &CROSS,
        ExecutionStatus::Running | ExecutionStatus::Pending => &SPINNER,
        ExecutionStatus::Skipped => &SKIP,
        ExecutionStatus::Cancelled => &WARN,
    }
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Passed { .. } => style("PASSED").green().to_string(),
        StepState::Failed { .. } => style("FAILED").red().to_string(),
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    let label = status.as_str().to_uppercase();
    match status {
        ExecutionStatus::Pending | ExecutionStatus::Skipped => style(label).dim().to_string(),
        ExecutionStatus::Running | ExecutionStatus::Cancelled => style(label).yellow().to_string(),
        ExecutionStatus::Passed => style(label).green().to_string(),
        ExecutionStatus::Failed => style(label).red().to_string(),
        ExecutionStatus::Errored => style(label).red().bold().to_string(),
    }
}

/// Format a recorded build for display
pub fn format_build_summary(summary: &BuildSummary) -> String {
    format!(
        "{}{} - {} - {} ({}/{} jobs) - {}",
        status_icon(summary.status),
        style(short_id(&summary.execution_id.to_string())).dim(),
        style(&summary.build_name).bold(),
        format_status(summary.status),
        summary.finished_jobs,
        summary.total_jobs,
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).cyan()
    )
}

/// Format a recorded job for display
pub fn format_job_summary(job: &JobSummary) -> String {
    let mut line = format!("  {}{} {}", status_icon(job.status), job.name, format_status(job.status));
    if let Some(step) = &job.failed_step {
        line.push_str(&format!(" at {}", style(step).red()));
    }
    if let Some(secs) = job.duration_secs {
        line.push_str(&format!(" {}", style(format!("({:.1}s)", secs)).dim()));
    }
    line
}

/// Format the final report of one job, with the failing step's output
pub fn format_job_report(job: &Job, max_lines: usize) -> String {
    let mut report = format!("{}{} {}", status_icon(job.status), style(job.name()).bold(), format_status(job.status));
    if let Some(duration) = job.duration() {
        report.push_str(&format!(" {}", style(format!("({:.1}s)", duration.as_secs_f64())).dim()));
    }

    for step in &job.steps {
        match &step.state {
            StepState::Failed { error, output, .. } => {
                report.push_str(&format!(
                    "\n    {} {} {}",
                    style(&step.id).red(),
                    step.label(),
                    style(error).dim()
                ));
                if !output.trim().is_empty() {
                    report.push('\n');
                    report.push_str(&indent(&format_output(output, max_lines), 6));
                }
            }
            StepState::Skipped { reason } if !step.disabled && job.status != ExecutionStatus::Skipped => {
                report.push_str(&format!("\n    {} {} ({})", style(&step.id).dim(), format_step_state(&step.state), reason));
            }
            _ => {}
        }
    }
    report
}

/// Format an execution event for display.
///
/// Returns `None` for events that only matter when streaming.
pub fn format_execution_event(event: &ExecutionEvent) -> Option<String> {
    let line = match event {
        ExecutionEvent::BuildStarted {
            execution_id,
            build_name,
            total_jobs,
        } => format!(
            "{}Starting build {} ({}) with {} job(s)",
            ROCKET,
            style(build_name).bold(),
            style(short_id(&execution_id.to_string())).dim(),
            total_jobs
        ),
        ExecutionEvent::JobStarted { job_name, .. } => {
            format!("{}{}", SPINNER, style(job_name).cyan())
        }
        ExecutionEvent::JobSkipped { job_name, reason, .. } => {
            format!("{}{} {}", SKIP, style(job_name).dim(), style(format!("({})", reason)).dim())
        }
        ExecutionEvent::StepStarted { .. }
        | ExecutionEvent::StepOutput { .. }
        | ExecutionEvent::StepSkipped { .. } => return None,
        ExecutionEvent::StepFinished {
            job_number,
            step_id,
            error: Some(error),
            ..
        } => format!(
            "{}#{} {}: {}",
            WARN,
            job_number,
            style(step_id).yellow(),
            style(error).dim()
        ),
        ExecutionEvent::StepFinished { .. } => return None,
        ExecutionEvent::JobFinished { job_name, status, .. } => {
            format!("{}{} {}", status_icon(*status), job_name, format_status(*status))
        }
        ExecutionEvent::BuildFinished { execution_id, status } => format!(
            "{}Build ({}) {}",
            INFO,
            style(short_id(&execution_id.to_string())).dim(),
            format_status(*status)
        ),
    };
    Some(line)
}

/// Why a run has nothing to do
pub fn empty_matrix_message(only: Option<&str>) -> String {
    match only {
        Some(pattern) => format!("No jobs match the --only pattern '{}'", pattern),
        None => "The build matrix expands to no jobs".to_string(),
    }
}

/// Format step output, keeping the last `max_lines` lines
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.trim_end().to_string()
    } else {
        let kept = lines[lines.len() - max_lines..].join("\n");
        format!(
            "{} ({} earlier lines)\n{}",
            style("[truncated]").dim(),
            lines.len() - max_lines,
            kept
        )
    }
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
