use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::error;
use wrf_pipeline::cli::commands::{HistoryCommand, RunCommand, ValidateCommand};
use wrf_pipeline::cli::output::*;
use wrf_pipeline::cli::{Cli, Command};
use wrf_pipeline::core::{ExecutionStatus, LocalProbeExecutor, RunConfig};
use wrf_pipeline::execution::{standard_stages, PipelineError, Workflow};
use wrf_pipeline::fetch::{DryRunDownloader, FetchPlan, HttpDownloader};
use wrf_pipeline::persistence::{ExecutionSummary, InMemoryPersistence, PersistenceBackend};
use wrf_pipeline::scheduler::QsubScheduler;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    wrf_pipeline::logging::init(cli.verbose, cli.log_file.as_deref())?;

    // Execute command
    let code = match &cli.command {
        Command::Run(cmd) => run_wrf(cmd).await?,
        Command::Validate(cmd) => validate_control(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

#[cfg(feature = "sqlite")]
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    let store = wrf_pipeline::persistence::SqliteExecutionStore::with_default_path().await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    tracing::warn!("Built without sqlite support, run history is kept in memory only");
    Ok(Arc::new(InMemoryPersistence::new()))
}

async fn run_wrf(cmd: &RunCommand) -> Result<i32> {
    let config = match cmd.load_config() {
        Ok(config) => config,
        Err(e) => {
            let err = PipelineError::from(e);
            println!("{} {}", CROSS, style(&err).red());
            return Ok(ExecutionStatus::Failed.exit_code());
        }
    };

    println!(
        "{} Loaded control file: {}",
        INFO,
        style(config.run_name()).bold()
    );
    if config.debug_mode {
        println!(
            "{} Debug mode is on: jobs are rendered but never submitted",
            WARN
        );
    }

    // Set up persistence
    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        open_store().await?
    };

    let workflow = Workflow::new(&config);
    let cleaner = workflow.cleaner();

    let progress = create_progress_bar(FetchPlan::from_config(&config).items().len());
    let prepared = if config.debug_mode {
        workflow.prepare(&DryRunDownloader, &cleaner, &progress).await
    } else {
        workflow
            .prepare(&HttpDownloader::new(), &cleaner, &progress)
            .await
    };
    if let Err(e) = prepared {
        let err = PipelineError::from(e);
        error!("{}", err);
        println!("\n{} {}", CROSS, style(&err).red());
        return Ok(ExecutionStatus::Failed.exit_code());
    }

    let scheduler = QsubScheduler::new().with_timeout(config.submit_timeout_secs);
    let probes = LocalProbeExecutor::new().with_command_timeout(config.probe_timeout_secs);
    let mut controller = workflow.controller(scheduler, probes, cleaner);

    // Set up event handler for console output
    controller.add_event_handler(|event| {
        println!("{}", format_execution_event(&event));
    });

    println!();
    let result = controller.run().await;
    let state = controller.into_state();

    // Save to history
    let summary = ExecutionSummary::from_state(config.run_name(), &state);
    if !cmd.no_history {
        store
            .save_execution(&summary)
            .await
            .context("Failed to save run history")?;
        println!(
            "\n{} Run saved to history (ID: {})",
            INFO,
            style(&summary.execution_id.to_string()[..8]).dim()
        );
    }

    println!("\n{}", style("Stage report").bold());
    for line in format_stage_report(state.records()) {
        println!("  {}", line);
    }

    // Print final status
    match result {
        Ok(ExecutionStatus::Completed) => {
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(config.run_name()).bold(),
                style("successfully").green()
            );
            Ok(0)
        }
        Ok(status) => {
            println!(
                "\n{} {} {}",
                WARN,
                style(config.run_name()).bold(),
                format_status(status)
            );
            Ok(status.exit_code())
        }
        Err(e) => {
            error!("{}", e);
            println!(
                "\n{} {} {}: {}",
                CROSS,
                style(config.run_name()).bold(),
                style("failed").red(),
                e
            );
            Ok(ExecutionStatus::Failed.exit_code())
        }
    }
}

fn validate_control(cmd: &ValidateCommand) -> Result<i32> {
    println!("{} Validating {}...", INFO, cmd.control.display());

    let config: RunConfig = match cmd.load_config() {
        Ok(config) => config,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            return Ok(1);
        }
    };

    println!("{} Control file is valid!", CHECK);
    for line in format_run_paths(&config) {
        println!("  {}", line);
    }

    let workflow = Workflow::new(&config);
    let stages = standard_stages(&config, workflow.writer());
    println!("\n  {}", style("Stages:").bold());
    for line in format_stage_plan(&stages) {
        println!("    {}", line);
    }

    if cmd.json {
        let json = serde_json::to_string_pretty(&config)?;
        println!("\n{}", json);
    }
    Ok(0)
}

async fn show_history(cmd: &HistoryCommand) -> Result<i32> {
    let store = open_store().await?;

    // If specific execution ID is requested
    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id =
            uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;
        match store.load_execution(exec_id).await? {
            Some(summary) => print_execution_details(&summary, cmd.verbose)?,
            None => println!("{} Execution not found", WARN),
        }
        return Ok(0);
    }

    let executions = store
        .list_executions(cmd.run.as_deref(), cmd.limit)
        .await?;

    if executions.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(0);
    }

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, cmd.limit);
        for summary in &executions {
            println!("  {}", format_execution_summary(summary));
        }
    }

    Ok(0)
}

fn print_execution_details(summary: &ExecutionSummary, verbose: bool) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Run: {}", style(&summary.run_name).bold());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!("  Stages:");
    for line in format_stage_report(&summary.stages) {
        println!("    {}", line);
    }

    if verbose {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}
