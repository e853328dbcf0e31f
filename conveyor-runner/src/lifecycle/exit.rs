//! Exit coordination
//!
//! Natural completion, signals and the time limit all end a run by sending
//! a status code on one channel. The coordinator takes the first status,
//! tears down the compose project once, and forwards the status to the
//! process exit path.

use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::compose::{ComposeProject, Invocation};
use crate::process::InvocationRunner;
use crate::service::JobLog;
use conveyor_core::domain::status::StatusCode;

/// Releases whatever resources a job run left behind
#[async_trait]
pub trait Teardown: Send + Sync {
    async fn teardown(&self) -> anyhow::Result<()>;
}

/// Removes the containers, networks and volumes of a compose project
pub struct ComposeTeardown {
    invoker: Arc<dyn InvocationRunner>,
    project: ComposeProject,
    working_dir: PathBuf,
}

impl ComposeTeardown {
    pub fn new(
        invoker: Arc<dyn InvocationRunner>,
        project: ComposeProject,
        working_dir: PathBuf,
    ) -> Self {
        Self {
            invoker,
            project,
            working_dir,
        }
    }
}

#[async_trait]
impl Teardown for ComposeTeardown {
    async fn teardown(&self) -> anyhow::Result<()> {
        let invocation =
            Invocation::compose("down", self.project.down()).in_dir(&self.working_dir);

        self.invoker
            .run(invocation, &CancellationToken::new())
            .await
            .with_context(|| format!("Failed to tear down project {}", self.project.name()))
    }
}

/// Single-use gate between "the run is over" and "the process exits"
pub struct ExitCoordinator {
    teardown: Arc<dyn Teardown>,
    log: Arc<dyn JobLog>,
}

impl ExitCoordinator {
    pub fn new(teardown: Arc<dyn Teardown>, log: Arc<dyn JobLog>) -> Self {
        Self { teardown, log }
    }

    pub fn spawn(
        self,
        exit: mpsc::Receiver<StatusCode>,
        final_exit: oneshot::Sender<StatusCode>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.wait(exit, final_exit))
    }

    /// Waits for the first status, cleans up, then forwards that status
    ///
    /// The inbound channel is closed after the first status so later
    /// writers fail to send instead of triggering another cleanup. If every
    /// writer goes away without sending, cleanup still runs and `Killed` is
    /// forwarded.
    pub async fn wait(
        self,
        mut exit: mpsc::Receiver<StatusCode>,
        final_exit: oneshot::Sender<StatusCode>,
    ) {
        let status = match exit.recv().await {
            Some(status) => status,
            None => {
                self.log
                    .warn("Exit channel closed without a status, treating the job as killed");
                StatusCode::Killed
            }
        };
        exit.close();

        self.log.warn(&format!(
            "Received an exit code of {} ({}), cleaning up",
            status.code(),
            status
        ));

        if let Err(e) = self.teardown.teardown().await {
            self.log.error(&format!("{:#}", e));
        }

        if final_exit.send(status).is_err() {
            self.log.warn("Final exit code was not received");
        }
    }
}
