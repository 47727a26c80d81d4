// src/main.rs
//! Robot Pool
//!
//! Loads one robot into a worker, runs it with the given parameters and
//! prints what it returned.

use anyhow::{bail, Context, Result};
use clap::Parser;
use robot_pool::observability::{init_metrics, init_tracing};
use robot_pool::{ExecutionService, Parameters, PoolManager, RobotOutput, ScriptCompiler, ServiceConfig};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "robot-pool")]
#[command(about = "Run robot scripts in a bounded worker pool", long_about = None)]
#[command(version)]
struct Cli {
    /// Fully-qualified robot name, e.g. `reports.daily.export`
    robot: String,

    /// Robot parameters as a JSON object
    #[arg(short, long, default_value = "{}")]
    params: String,

    /// Configuration file (defaults to ./robot-pool.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => ServiceConfig::load_from(path)?,
        None => ServiceConfig::load()?,
    };

    // Initialize observability (tracing, metrics)
    init_tracing(&config.observability)?;
    init_metrics(&config.observability)?;

    info!("Starting Robot Pool v{}", robot_pool::VERSION);
    info!(
        max_executors = config.pool.max_executors,
        work_directory = %config.pool.work_directory.display(),
        "Configuration loaded"
    );

    let parameters = parse_parameters(&cli.params)?;

    let compiler = Arc::new(ScriptCompiler::new(config.robot.kill_grace()));
    let manager = Arc::new(PoolManager::new(&config, compiler)?);
    let service = ExecutionService::new(Arc::clone(&manager));

    let id = service.allocate_worker(&cli.robot).await?;
    let result = run_until_interrupted(&service, id, &parameters).await;

    if let Err(e) = service.release_worker(id).await {
        warn!(worker_id = %id, error = %e, "Failed to release worker");
    }
    let report = manager.shutdown().await;
    if !report.is_clean() {
        warn!(skipped = report.skipped.len(), failed = report.failed.len(), "Pool did not shut down cleanly");
    }

    match result? {
        RobotOutput::Void => {}
        RobotOutput::Value(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        RobotOutput::Stream(bytes) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }

    info!("Robot Pool stopped");
    Ok(())
}

/// Run the worker; on Ctrl-C ask it to stop and wait for the run to end
async fn run_until_interrupted(
    service: &ExecutionService,
    id: robot_pool::WorkerId,
    parameters: &Parameters,
) -> robot_pool::Result<RobotOutput> {
    let run = service.run_worker(id, parameters);
    tokio::pin!(run);

    let finished = tokio::select! {
        result = &mut run => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match finished {
        Some(result) => result,
        None => {
            info!(worker_id = %id, "Received shutdown signal, stopping robot...");
            if let Err(e) = service.stop_worker(id).await {
                error!(worker_id = %id, error = %e, "Failed to stop robot");
            }
            run.await
        }
    }
}

fn parse_parameters(raw: &str) -> Result<Parameters> {
    let value: serde_json::Value = serde_json::from_str(raw).context("--params is not valid JSON")?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("--params must be a JSON object, got {}", other),
    }
}
