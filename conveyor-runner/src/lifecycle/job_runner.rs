//! Job runner
//!
//! Drives one job through its phases in a fixed order:
//! init, login, pull, data containers, inputs, steps, upload, report.
//!
//! Data containers, inputs and steps only run while every earlier phase
//! succeeded. Outputs are always uploaded so logs from failed runs are not
//! lost, and an upload failure replaces whatever status came before it.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::credentials;
use crate::process::InvocationRunner;
use crate::service::{JobLog, StageError, StageExecutor, StatusReporter};
use crate::workspace::Workspace;
use conveyor_core::domain::job::Job;
use conveyor_core::domain::status::StatusCode;

/// State of one job run
pub struct JobRunner {
    job: Arc<Job>,
    workspace: Workspace,
    executor: StageExecutor,
    reporter: StatusReporter,
    log: Arc<dyn JobLog>,
    status: StatusCode,
}

impl JobRunner {
    pub fn new(
        job: Arc<Job>,
        workspace: Workspace,
        invoker: Arc<dyn InvocationRunner>,
        reporter: StatusReporter,
        log: Arc<dyn JobLog>,
    ) -> Self {
        let executor = StageExecutor::new(
            Arc::clone(&job),
            workspace.working_dir().to_path_buf(),
            workspace.logs_dir().to_path_buf(),
            invoker,
            reporter.clone(),
            Arc::clone(&log),
        );

        Self {
            job,
            workspace,
            executor,
            reporter,
            log,
            status: StatusCode::Success,
        }
    }

    pub fn project_name(&self) -> &str {
        self.executor.project().name()
    }

    /// Runs the job and sends the final status on `exit`
    pub async fn execute(self, cancel: CancellationToken, exit: mpsc::Sender<StatusCode>) {
        let log = Arc::clone(&self.log);
        let status = self.run(&cancel).await;

        if exit.send(status).await.is_err() {
            log.warn(&format!(
                "Job finished with status {} after shutdown had already begun",
                status
            ));
        }
    }

    /// Runs every phase and returns the final status
    pub async fn run(mut self, cancel: &CancellationToken) -> StatusCode {
        if let Err(e) = self.workspace.init(&self.job, self.log.as_ref()) {
            self.log.error(&format!("{:#}", e));
        }

        self.reporter
            .running(format!(
                "Job {} is running on host {}",
                self.job.invocation_id,
                self.reporter.host()
            ))
            .await;

        // Images may be public, so a failed login does not stop the job
        if let Err(e) = self.docker_login(cancel).await {
            self.log.error(&format!("{:#}", e));
        }

        let pulled = self.executor.pull(cancel).await;
        self.record(pulled);

        if let Err(e) = self.workspace.write_job_summary(&self.job) {
            self.log.error(&format!("{:#}", e));
        }
        if let Err(e) = self.workspace.write_job_parameters(&self.job) {
            self.log.error(&format!("{:#}", e));
        }

        if self.status.is_success() {
            let created = self.executor.create_data_containers(cancel).await;
            self.record(created);
        }

        // Without the right images there is no point in staging data
        if self.status.is_success() {
            let downloaded = self.executor.download_inputs(cancel).await;
            self.record(downloaded);
        }

        if self.status.is_success() {
            let ran = self.executor.run_steps(cancel).await;
            self.record(ran);
        }

        let uploaded = self.executor.upload_outputs().await;
        self.record(uploaded);

        self.report().await;
        self.status
    }

    async fn docker_login(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let creds = match credentials::resolve(&self.job) {
            Ok(creds) => creds,
            Err(e) => {
                self.reporter
                    .running(format!("Error reading registry credentials: {}", e))
                    .await;
                return Err(e.into());
            }
        };
        self.executor.login(&creds, cancel).await
    }

    /// Makes a phase failure the job status
    fn record(&mut self, outcome: Result<(), StageError>) {
        if let Err(e) = outcome {
            self.log.error(&e.to_string());
            self.status = e.status();
        }
    }

    async fn report(&self) {
        let published = if self.status.is_success() {
            self.reporter.success().await
        } else {
            self.reporter
                .failure(format!("Job exited with a status of {}", self.status.code()))
                .await
        };

        if let Err(e) = published {
            self.log.error(&format!("{:#}", e));
        }
    }
}
