use anyhow::{Context, Result};
use cimatrix::cli::commands::{
    HistoryCommand, ListCommand, RunCommand, SchedulingStrategyArg, ValidateCommand,
};
use cimatrix::cli::output::*;
use cimatrix::cli::terminal_output::TerminalOutput;
use cimatrix::cli::{Cli, Command};
use cimatrix::core::{Build, BuildOptions, CiConfig, ExecutionStatus, Job};
use cimatrix::execution::{ExecutionEngine, ExecutionEvent, SchedulingStrategy, Workspace};
use cimatrix::persistence::{create_summary, BuildSummary, InMemoryPersistence, PersistenceBackend};
use cimatrix::runner::{RunnerConfig, ShellRunner};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Lines of a failing step's output shown in the final report
const REPORT_OUTPUT_LINES: usize = 20;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_build(cmd, cli.stream).await?,
        Command::Validate(cmd) => validate_config(cmd)?,
        Command::List(cmd) => list_builds(cmd).await?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

/// Open the history store, or an ephemeral one when history is off
async fn open_history(enabled: bool) -> Result<Arc<dyn PersistenceBackend>> {
    if !enabled {
        return Ok(Arc::new(InMemoryPersistence::new()));
    }

    #[cfg(feature = "sqlite")]
    let store: Arc<dyn PersistenceBackend> =
        Arc::new(cimatrix::persistence::SqliteBuildStore::with_default_path().await?);

    #[cfg(not(feature = "sqlite"))]
    let store: Arc<dyn PersistenceBackend> = {
        warn!("Built without the sqlite feature, history is not kept between runs");
        Arc::new(InMemoryPersistence::new())
    };

    Ok(store)
}

/// Values for the config's `secure` entries, taken from the host environment
fn collect_secrets(config: &CiConfig) -> HashMap<String, String> {
    config
        .secure_names()
        .into_iter()
        .filter_map(|name| std::env::var(name).ok().map(|value| (name.to_string(), value)))
        .collect()
}

/// Project directory: `--workdir`, else the config file's directory
fn resolve_workdir(cmd: &RunCommand) -> PathBuf {
    match &cmd.workdir {
        Some(dir) => PathBuf::from(dir),
        None => match Path::new(&cmd.file).parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        },
    }
}

async fn run_build(cmd: &RunCommand, stream: bool) -> Result<()> {
    let config = CiConfig::from_file(&cmd.file).context("Failed to load CI configuration")?;

    println!("{}Loaded build: {}", INFO, style(config.display_name()).bold());

    let only = cmd
        .only
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("Invalid --only pattern")?;
    for (name, value) in &cmd.var {
        println!(
            "{}Variable override: {} = {}",
            INFO,
            style(name).cyan(),
            style(value).dim()
        );
    }

    let options = BuildOptions {
        secrets: collect_secrets(&config),
        overrides: cmd.var.clone(),
        only,
    };
    let mut build = Build::from_config(&config, &options)?;

    if build.jobs.is_empty() {
        warn!("{}", empty_matrix_message(cmd.only.as_deref()));
        return Ok(());
    }

    if cmd.dry_run {
        print_plan(&build);
        return Ok(());
    }

    let store = open_history(!cmd.no_history).await?;

    let workdir = resolve_workdir(cmd);
    let runner = ShellRunner::new(
        RunnerConfig::new()
            .with_shell(cmd.shell.clone())
            .with_workdir(workdir.clone()),
    );

    let strategy = cmd.scheduling_strategy();
    let workspace = if cmd.in_place {
        if !matches!(cmd.strategy, SchedulingStrategyArg::Sequential) {
            println!("{}--in-place runs jobs one at a time", INFO);
        }
        Workspace::Shared
    } else {
        Workspace::Isolated { source: workdir }
    };
    let mut engine = ExecutionEngine::new(runner, strategy).with_workspace(workspace);
    if cmd.all_os {
        engine = engine.with_host_os(None);
    }

    // Console output: streamed lines, or a progress bar across jobs
    if stream {
        let printer = Arc::new(TerminalOutput::new(strategy == SchedulingStrategy::Sequential));
        engine.add_event_handler(move |event| {
            printer.on_event(&event);
            if let Some(line) = format_execution_event(&event) {
                println!("{}", line);
            }
        });
    } else {
        let progress = create_progress_bar(build.jobs.len());
        engine.add_event_handler(move |event| {
            if let Some(line) = format_execution_event(&event) {
                progress.println(line);
            }
            match event {
                ExecutionEvent::JobFinished { .. } | ExecutionEvent::JobSkipped { .. } => {
                    progress.inc(1)
                }
                ExecutionEvent::BuildFinished { .. } => progress.finish_and_clear(),
                _ => {}
            }
        });
    }

    println!();
    let result = engine.execute(&mut build).await;

    // Save to history
    if !cmd.no_history {
        let summary = create_summary(&build);
        store.save_build(&summary).await?;
        println!(
            "\n{}Build saved to history (ID: {})",
            INFO,
            style(&summary.execution_id.to_string()[..8]).dim()
        );
    }

    let verdict = match result {
        Ok(verdict) => verdict,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };

    println!();
    for job in &build.jobs {
        println!("{}", format_job_report(job, REPORT_OUTPUT_LINES));
    }
    println!(
        "\n{}{} {} ({} passed, {} failed, {} errored, {} skipped)",
        status_icon(verdict),
        style(&build.name).bold(),
        format_status(verdict),
        build.jobs_with_status(ExecutionStatus::Passed).len(),
        build.jobs_with_status(ExecutionStatus::Failed).len(),
        build.jobs_with_status(ExecutionStatus::Errored).len(),
        build.jobs_with_status(ExecutionStatus::Skipped).len(),
    );

    if !verdict.is_success() {
        std::process::exit(1);
    }

    Ok(())
}

fn print_plan(build: &Build) {
    println!("{}Build {} expands to {} job(s):", INFO, style(&build.name).bold(), build.jobs.len());
    for job in &build.jobs {
        println!("\n  {}", style(job.name()).bold());
        for var in job.env.vars() {
            println!("    {}={}", style(&var.name).cyan(), var.display_value());
        }
        for step in &job.steps {
            let note = if step.disabled { " (disabled)" } else { "" };
            println!("    {} {}{}", style(&step.id).dim(), job.env.mask(&step.command), style(note).dim());
        }
    }
}

fn job_json(job: &Job) -> serde_json::Value {
    let env: serde_json::Map<String, serde_json::Value> = job
        .env
        .vars()
        .iter()
        .map(|var| (var.name.clone(), var.display_value().into()))
        .collect();
    let steps: Vec<serde_json::Value> = job
        .steps
        .iter()
        .map(|step| {
            serde_json::json!({
                "id": step.id,
                "phase": step.phase,
                "command": job.env.mask(&step.command),
                "disabled": step.disabled,
            })
        })
        .collect();
    serde_json::json!({
        "number": job.number,
        "name": job.name(),
        "os": job.os,
        "interpreter_version": job.interpreter_version,
        "env": env,
        "steps": steps,
    })
}

fn validate_config(cmd: &ValidateCommand) -> Result<()> {
    println!("{}Validating {}...", INFO, cmd.file);

    let result = CiConfig::from_file(&cmd.file)
        .and_then(|config| Build::from_config(&config, &BuildOptions::default()).map(|b| (config, b)));

    match result {
        Ok((config, build)) => {
            println!("{}Configuration is valid!", CHECK);
            println!("  Name: {}", style(config.display_name()).bold());
            println!("  Jobs: {}", style(build.jobs.len()).cyan());
            for job in &build.jobs {
                println!("    {}", job.name());
            }
            if !config.deploy_enabled() && !config.phase_steps(cimatrix::Phase::Deploy).is_empty() {
                println!("  Deploy: {}", style("disabled").dim());
            }

            if cmd.json {
                let jobs: Vec<_> = build.jobs.iter().map(job_json).collect();
                let data = serde_json::json!({
                    "name": config.display_name(),
                    "jobs": jobs,
                });
                println!("\n{}", serde_json::to_string_pretty(&data)?);
            }
            Ok(())
        }
        Err(e) => {
            println!("{}Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn list_builds(cmd: &ListCommand) -> Result<()> {
    let store = open_history(true).await?;
    let names = store.list_build_names().await?;

    if names.is_empty() {
        println!("{}No builds found in history", INFO);
        return Ok(());
    }

    if cmd.json {
        let mut json_data = Vec::new();
        for name in &names {
            let builds = store.list_builds(name).await?;
            json_data.push(serde_json::json!({
                "name": name,
                "build_count": builds.len(),
            }));
        }
        let data = serde_json::json!({ "builds": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{}Builds in history:", INFO);

    for name in &names {
        if cmd.with_counts {
            let builds = store.list_builds(name).await?;
            let count = |status: ExecutionStatus| builds.iter().filter(|b| b.status == status).count();
            println!(
                "  {} ({} runs: {} passed, {} failed, {} errored)",
                style(name).bold(),
                style(builds.len()).cyan(),
                style(count(ExecutionStatus::Passed)).green(),
                style(count(ExecutionStatus::Failed)).red(),
                style(count(ExecutionStatus::Errored)).red()
            );
        } else {
            println!("  {}", style(name).bold());
        }
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_history(true).await?;

    // A single build by ID
    if let Some(id) = &cmd.build_id {
        let id = uuid::Uuid::parse_str(id).context("Invalid build ID format")?;
        match store.load_build(id).await? {
            Some(summary) if cmd.json => println!("{}", serde_json::to_string_pretty(&summary)?),
            Some(summary) => print_build_details(&summary),
            None => println!("{}Build not found", WARN),
        }
        return Ok(());
    }

    let mut builds = match &cmd.name {
        Some(name) => store.list_builds(name).await?,
        None => {
            let mut all = Vec::new();
            for name in store.list_build_names().await? {
                all.extend(store.list_builds(&name).await?);
            }
            all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all
        }
    };
    builds.truncate(cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "builds": builds });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if builds.is_empty() {
        println!("{}No builds found", INFO);
        return Ok(());
    }

    println!("{}Build history (showing latest {}):", INFO, cmd.limit);
    for summary in &builds {
        println!("  {}", format_build_summary(summary));
        if cmd.details {
            for job in &summary.jobs {
                println!("  {}", format_job_summary(job));
            }
        }
    }

    Ok(())
}

fn print_build_details(summary: &BuildSummary) {
    println!("{}Build Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Name: {}", style(&summary.build_name).bold());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(finished) = summary.finished_at {
        println!("  Finished: {}", style(finished.to_rfc3339()).dim());
        if let Ok(duration) = finished.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Progress: {} ({}/{} jobs)",
        style(format!("{:.0}%", summary.progress * 100.0)).cyan(),
        summary.finished_jobs,
        summary.total_jobs
    );
    println!("  Jobs:");
    for job in &summary.jobs {
        println!("  {}", format_job_summary(job));
    }
}

fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
