//! Compose command construction
//!
//! Handles everything about *which* executable runs for an invocation:
//! - Resolving a standalone compose binary or `<engine> compose`
//! - Namespacing compose calls with the job's project name
//! - Describing per-invocation output routing and working directory
//!
//! Running the resulting command is the process runner's job.

use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use conveyor_core::domain::job::Job;

/// Compose descriptor expected in the job's working directory
pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// Executable family an invocation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    /// The container engine itself (e.g., `docker login`)
    Engine,
    /// Compose, either standalone or as an engine subcommand
    Compose,
}

/// Where an invocation's stdout and stderr go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Forwarded line by line to the job log
    Log,
    /// Written to the given files, truncating them first
    Files { stdout: PathBuf, stderr: PathBuf },
}

/// One external invocation, described but not yet built
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Short name used in logs (service name, registry, ...)
    pub label: String,
    pub program: Program,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub output: Output,
}

impl Invocation {
    pub fn compose(label: impl Into<String>, args: Vec<String>) -> Self {
        Self::new(label, Program::Compose, args)
    }

    pub fn engine(label: impl Into<String>, args: Vec<String>) -> Self {
        Self::new(label, Program::Engine, args)
    }

    fn new(label: impl Into<String>, program: Program, args: Vec<String>) -> Self {
        Self {
            label: label.into(),
            program,
            args,
            working_dir: None,
            output: Output::Log,
        }
    }

    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.working_dir = Some(dir.to_path_buf());
        self
    }

    pub fn with_output_files(mut self, stdout: PathBuf, stderr: PathBuf) -> Self {
        self.output = Output::Files { stdout, stderr };
        self
    }
}

/// A built command tied to the cancellation token that may stop it
pub struct BoundCommand {
    pub command: Command,
    pub cancel: CancellationToken,
}

/// Builds engine and compose commands from configuration
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    docker_path: PathBuf,
    compose_path: Option<PathBuf>,
}

impl CommandBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            docker_path: config.docker_path.clone(),
            compose_path: config.docker_compose_path.clone(),
        }
    }

    /// Resolves the executable and final argument list for an invocation
    ///
    /// A configured compose binary is called directly; otherwise the engine
    /// is called with `compose` prepended.
    pub fn resolve(&self, program: Program, args: &[String]) -> (PathBuf, Vec<String>) {
        match (program, &self.compose_path) {
            (Program::Compose, Some(compose)) => (compose.clone(), args.to_vec()),
            (Program::Compose, None) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push("compose".to_string());
                full.extend_from_slice(args);
                (self.docker_path.clone(), full)
            }
            (Program::Engine, _) => (self.docker_path.clone(), args.to_vec()),
        }
    }

    /// Builds a ready-to-run command bound to `cancel`
    ///
    /// The command inherits the runner's environment and is killed if it is
    /// dropped before exiting.
    pub fn build(&self, invocation: &Invocation, cancel: &CancellationToken) -> BoundCommand {
        let (program, args) = self.resolve(invocation.program, &invocation.args);

        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        BoundCommand {
            command,
            cancel: cancel.clone(),
        }
    }
}

/// Compose project namespace for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    name: String,
}

impl ComposeProject {
    /// Derives the project name from the invocation ID with dashes removed
    pub fn for_job(job: &Job) -> Self {
        Self {
            name: job.invocation_id.replace('-', ""),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `-p <project> -f docker-compose.yml` followed by `rest`
    pub fn args<I, S>(&self, rest: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = vec![
            "-p".to_string(),
            self.name.clone(),
            "-f".to_string(),
            COMPOSE_FILE.to_string(),
        ];
        args.extend(rest.into_iter().map(Into::into));
        args
    }

    /// Runs a single service to completion, exiting with its exit code
    pub fn up(&self, service: &str) -> Vec<String> {
        self.args([
            "up",
            "--abort-on-container-exit",
            "--exit-code-from",
            service,
            "--no-color",
            service,
        ])
    }

    pub fn pull(&self) -> Vec<String> {
        self.args(["pull", "--parallel"])
    }

    /// Tears down containers, networks and volumes of the project
    pub fn down(&self) -> Vec<String> {
        self.args(["down", "-v"])
    }
}
