//! Stage execution
//!
//! Runs each pipeline stage as one or more blocking compose invocations:
//! - Logging into registries
//! - Pulling images
//! - Creating data containers
//! - Downloading inputs
//! - Running the tool steps
//! - Uploading outputs
//!
//! Every stage maps its failure to one fixed status code and publishes
//! progress messages before and after each invocation.

use anyhow::Context as _;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::compose::{ComposeProject, Invocation};
use crate::credentials::RegistryCredentials;
use crate::process::{InvocationError, InvocationRunner};
use crate::service::{JobLog, StatusReporter};
use conveyor_core::domain::job::{Job, Step};
use conveyor_core::domain::status::StatusCode;

/// A stage failure and the status code it maps to
#[derive(Debug, Error)]
#[error("{description}: {source}")]
pub struct StageError {
    status: StatusCode,
    description: String,
    #[source]
    source: InvocationError,
}

impl StageError {
    fn new(status: StatusCode, description: impl Into<String>, source: InvocationError) -> Self {
        Self {
            status,
            description: description.into(),
            source,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// Paths and collaborators a stage needs to build its invocations
pub struct StageExecutor {
    job: Arc<Job>,
    project: ComposeProject,
    working_dir: PathBuf,
    logs_dir: PathBuf,
    invoker: Arc<dyn InvocationRunner>,
    reporter: StatusReporter,
    log: Arc<dyn JobLog>,
}

impl StageExecutor {
    pub fn new(
        job: Arc<Job>,
        working_dir: PathBuf,
        logs_dir: PathBuf,
        invoker: Arc<dyn InvocationRunner>,
        reporter: StatusReporter,
        log: Arc<dyn JobLog>,
    ) -> Self {
        let project = ComposeProject::for_job(&job);
        Self {
            job,
            project,
            working_dir,
            logs_dir,
            invoker,
            reporter,
            log,
        }
    }

    pub fn project(&self) -> &ComposeProject {
        &self.project
    }

    /// Compose `up` for one service, run from the working directory
    fn up(&self, service: &str) -> Invocation {
        Invocation::compose(service, self.project.up(service)).in_dir(&self.working_dir)
    }

    fn log_path(&self, name: String) -> PathBuf {
        self.logs_dir.join(name)
    }

    /// Logs into every registry in `creds`, stopping at the first failure
    pub async fn login(
        &self,
        creds: &RegistryCredentials,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        for (registry, cred) in creds {
            let mut args = vec![
                "login".to_string(),
                "--username".to_string(),
                cred.username.clone(),
                "--password".to_string(),
                cred.password.clone(),
            ];
            // An empty host means the engine's default registry
            if !registry.is_empty() {
                args.push(registry.clone());
            }

            let invocation =
                Invocation::engine(format!("login {}", registry), args).in_dir(&self.working_dir);

            self.reporter
                .running(format!("Logging into Docker registry '{}'", registry))
                .await;

            if let Err(e) = self.invoker.run(invocation, cancel).await {
                self.reporter
                    .running(format!(
                        "Error logging into Docker registry '{}': {}",
                        registry, e
                    ))
                    .await;
                return Err(e)
                    .with_context(|| format!("failed to log into Docker registry '{}'", registry));
            }

            self.reporter
                .running(format!("Finished logging into Docker registry '{}'", registry))
                .await;
        }

        Ok(())
    }

    /// Pulls every image in the compose file, in parallel inside the engine
    pub async fn pull(&self, cancel: &CancellationToken) -> Result<(), StageError> {
        self.log.debug("Pulling images");
        self.reporter.running("Pulling tool container images").await;

        let invocation = Invocation::compose("pull", self.project.pull()).in_dir(&self.working_dir);

        if let Err(e) = self.invoker.run(invocation, cancel).await {
            self.reporter
                .running(format!("Error pulling tool container images: {}", e))
                .await;
            return Err(StageError::new(
                StatusCode::DockerPullFailed,
                "failed to pull tool container images",
                e,
            ));
        }

        self.reporter
            .running("Finished pulling tool container images")
            .await;
        Ok(())
    }

    /// Creates the data containers of every step, in step order
    pub async fn create_data_containers(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(), StageError> {
        for (step_index, step) in self.job.steps.iter().enumerate() {
            for data_index in 0..step.container().volumes_from.len() {
                let service = format!("data_{}_{}", step_index, data_index);
                self.reporter
                    .running(format!("creating data container {}", service))
                    .await;

                if let Err(e) = self.invoker.run(self.up(&service), cancel).await {
                    self.reporter
                        .running(format!("error creating data container {}: {}", service, e))
                        .await;
                    return Err(StageError::new(
                        StatusCode::DockerCreateFailed,
                        format!("failed to create data container {}", service),
                        e,
                    ));
                }

                self.reporter
                    .running(format!("finished creating data container {}", service))
                    .await;
            }
        }

        Ok(())
    }

    /// Downloads the job inputs
    ///
    /// A job with an input manifest downloads everything in one invocation;
    /// otherwise each input gets its own service, run in order.
    pub async fn download_inputs(&self, cancel: &CancellationToken) -> Result<(), StageError> {
        if let Some(manifest) = self.job.input_manifest() {
            return self.download_input("download_inputs", manifest, cancel).await;
        }

        for (index, input) in self.job.inputs().into_iter().enumerate() {
            let service = format!("input_{}", index);
            self.download_input(&service, input.source_path(), cancel)
                .await?;
        }

        Ok(())
    }

    async fn download_input(
        &self,
        service: &str,
        input_path: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StageError> {
        self.reporter
            .running(format!("Downloading {}", input_path))
            .await;

        let invocation = self.up(service).with_output_files(
            self.log_path(format!("logs-stdout-{}", service)),
            self.log_path(format!("logs-stderr-{}", service)),
        );

        if let Err(e) = self.invoker.run(invocation, cancel).await {
            self.reporter
                .running(format!("error downloading {}: {}", input_path, e))
                .await;
            return Err(StageError::new(
                StatusCode::InputFailed,
                format!("failed to download {}", input_path),
                e,
            ));
        }

        self.reporter
            .running(format!("finished downloading {}", input_path))
            .await;
        Ok(())
    }

    /// Runs every tool step in job order, stopping at the first failure
    pub async fn run_steps(&self, cancel: &CancellationToken) -> Result<(), StageError> {
        for (index, step) in self.job.steps.iter().enumerate() {
            self.run_step(index, step, cancel).await?;
        }
        Ok(())
    }

    async fn run_step(
        &self,
        index: usize,
        step: &Step,
        cancel: &CancellationToken,
    ) -> Result<(), StageError> {
        let image = &step.container().image;
        let image = format!("{}:{}", image.name, image.tag);
        let arguments = step.arguments().join(" ");

        self.reporter
            .running(format!(
                "Running tool container {} with arguments: {}",
                image, arguments
            ))
            .await;

        let service = format!("step_{}", index);
        let invocation = self.up(&service).with_output_files(
            self.log_path(format!("docker-compose-step-stdout-{}", index)),
            self.log_path(format!("docker-compose-step-stderr-{}", index)),
        );

        if let Err(e) = self.invoker.run(invocation, cancel).await {
            self.reporter
                .running(format!(
                    "Error running tool container {} with arguments '{}': {}",
                    image, arguments, e
                ))
                .await;
            return Err(StageError::new(
                StatusCode::StepFailed,
                format!("step {} ({}) failed", index, image),
                e,
            ));
        }

        self.reporter
            .running(format!(
                "Tool container {} with arguments '{}' finished successfully",
                image, arguments
            ))
            .await;
        Ok(())
    }

    /// Uploads outputs and logs
    ///
    /// Not tied to the job's cancellation token: logs from a cancelled or
    /// failed run are still transferred.
    pub async fn upload_outputs(&self) -> Result<(), StageError> {
        let output_dir = self.job.output_directory();
        self.reporter
            .running(format!("Beginning to upload outputs to {}", output_dir))
            .await;

        let invocation = self.up("upload_outputs").with_output_files(
            self.log_path("logs-stdout-output".to_string()),
            self.log_path("logs-stderr-output".to_string()),
        );

        if let Err(e) = self
            .invoker
            .run(invocation, &CancellationToken::new())
            .await
        {
            self.reporter
                .running(format!("Error uploading outputs to {}: {}", output_dir, e))
                .await;
            return Err(StageError::new(
                StatusCode::OutputFailed,
                format!("failed to upload outputs to {}", output_dir),
                e,
            ));
        }

        self.reporter
            .running(format!("Done uploading outputs to {}", output_dir))
            .await;
        Ok(())
    }
}
