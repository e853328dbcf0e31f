//! Conveyor Runner
//!
//! Executes one job as an ordered pipeline of compose services on this host.
//!
//! Architecture:
//! - Configuration: CLI flags with environment fallbacks
//! - Compose/process: building and running engine invocations
//! - Services: stage execution, job updates, job log
//! - Lifecycle: the job state machine and shutdown coordination
//!
//! The runner reads the job description, runs every phase, publishes the
//! outcome and exits with the job's status code after tearing down the
//! job's compose project.

mod compose;
mod config;
mod credentials;
mod lifecycle;
mod process;
mod service;
#[cfg(test)]
mod testing;
mod workspace;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::compose::{CommandBuilder, ComposeProject};
use crate::config::Config;
use crate::lifecycle::{
    ComposeTeardown, ExitCoordinator, JobRunner, spawn_signal_listener, spawn_time_limit,
};
use crate::process::{InvocationRunner, ProcessRunner};
use crate::service::{JobLog, JobUpdatePublisher, LogPublisher, StatusReporter, TracingJobLog};
use crate::workspace::Workspace;
use conveyor_client::UpdateClient;
use conveyor_core::domain::job::Job;
use conveyor_core::domain::status::StatusCode;

#[derive(Parser)]
#[command(name = "conveyor-runner")]
#[command(about = "Runs one job as a pipeline of compose services", long_about = None)]
struct Cli {
    /// Job description file (JSON)
    #[arg(long, env = "CONVEYOR_JOB", default_value = "job.json")]
    job: PathBuf,

    /// Container engine executable
    #[arg(long, env = "CONVEYOR_DOCKER_PATH", default_value = "docker")]
    docker_path: PathBuf,

    /// Standalone compose executable; `<docker-path> compose` is used when unset
    #[arg(long, env = "CONVEYOR_DOCKER_COMPOSE_PATH")]
    docker_compose_path: Option<PathBuf>,

    /// Base URL of the job update endpoint
    #[arg(long, env = "CONVEYOR_UPDATE_URL")]
    update_url: Option<String>,

    /// Maximum job run time in seconds
    #[arg(long, env = "CONVEYOR_TIME_LIMIT")]
    time_limit: Option<u64>,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            docker_path: self.docker_path.clone(),
            docker_compose_path: self.docker_compose_path.clone(),
            update_url: self.update_url.clone(),
            time_limit: self.time_limit.map(Duration::from_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conveyor_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.config();
    config.validate()?;

    let job = Arc::new(load_job(&cli.job)?);
    info!(
        "Loaded job {} ({} step(s)) from {}",
        job.invocation_id,
        job.steps.len(),
        cli.job.display()
    );

    let working_dir = std::env::current_dir().unwrap_or_else(|e| {
        error!("Failed to resolve the working directory, using '.': {}", e);
        PathBuf::from(".")
    });

    let log: Arc<dyn JobLog> = Arc::new(TracingJobLog::new(&job.invocation_id));
    let invoker: Arc<dyn InvocationRunner> = Arc::new(ProcessRunner::new(
        CommandBuilder::new(&config),
        Arc::clone(&log),
    ));
    let publisher: Arc<dyn JobUpdatePublisher> = match &config.update_url {
        Some(url) => Arc::new(UpdateClient::new(url.clone())),
        None => {
            info!("No update URL configured, job updates will only be logged");
            Arc::new(LogPublisher)
        }
    };
    let reporter = StatusReporter::new(publisher, Arc::clone(&job), host_name(), Arc::clone(&log));

    let cancel = CancellationToken::new();
    let (exit_tx, exit_rx) = mpsc::channel(4);
    let (final_tx, final_rx) = oneshot::channel();

    let teardown = ComposeTeardown::new(
        Arc::clone(&invoker),
        ComposeProject::for_job(&job),
        working_dir.clone(),
    );
    ExitCoordinator::new(Arc::new(teardown), Arc::clone(&log)).spawn(exit_rx, final_tx);

    if let Err(e) = spawn_signal_listener(cancel.clone(), exit_tx.clone()) {
        warn!("{:#}", e);
    }
    if let Some(limit) = config.time_limit {
        spawn_time_limit(limit, cancel.clone(), exit_tx.clone());
    }

    let runner = JobRunner::new(
        Arc::clone(&job),
        Workspace::new(&working_dir),
        invoker,
        reporter,
        log,
    );
    info!("Running job {} as project {}", job.invocation_id, runner.project_name());
    tokio::spawn(runner.execute(cancel, exit_tx));

    let status = final_rx.await.unwrap_or(StatusCode::Killed);
    info!("Exiting with status {} ({})", status.code(), status);
    std::process::exit(status.code());
}

fn load_job(path: &Path) -> Result<Job> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse job file {}", path.display()))
}

/// Host name reported as the sender of job updates
fn host_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| {
            error!("Failed to determine the host name");
            "UNKNOWN".to_string()
        })
}
