//! External process execution
//!
//! Runs built invocations to completion. Output is either written to the
//! invocation's log files or forwarded line by line to the job log. A
//! cancelled token kills the child and reports the invocation as failed.

use async_trait::async_trait;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::compose::{BoundCommand, CommandBuilder, Invocation, Output};
use crate::service::JobLog;

/// Why an external invocation did not succeed
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("failed to start '{label}': {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for '{label}': {source}")]
    Wait {
        label: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{label}' {status}")]
    Exit { label: String, status: ExitStatus },

    #[error("'{label}' was cancelled")]
    Cancelled { label: String },
}

/// Runs invocations of the container engine
///
/// Each call blocks the caller until the external process exits. Any
/// non-zero exit is a failure; exit codes are not interpreted further.
#[async_trait]
pub trait InvocationRunner: Send + Sync {
    async fn run(
        &self,
        invocation: Invocation,
        cancel: &CancellationToken,
    ) -> Result<(), InvocationError>;
}

/// Runs invocations as real child processes
pub struct ProcessRunner {
    builder: CommandBuilder,
    log: Arc<dyn JobLog>,
}

impl ProcessRunner {
    pub fn new(builder: CommandBuilder, log: Arc<dyn JobLog>) -> Self {
        Self { builder, log }
    }

    /// Opens a log file for a child stream, discarding output if that fails
    fn log_file(&self, path: &Path) -> Stdio {
        match std::fs::File::create(path) {
            Ok(file) => Stdio::from(file),
            Err(e) => {
                self.log.error(&format!(
                    "Failed to create log file {}: {}",
                    path.display(),
                    e
                ));
                Stdio::null()
            }
        }
    }

    fn forward_lines<R>(&self, label: &str, stream: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let log = Arc::clone(&self.log);
        let label = label.to_string();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log.info(&format!("[{}] {}", label, line));
            }
        })
    }
}

#[async_trait]
impl InvocationRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: Invocation,
        cancel: &CancellationToken,
    ) -> Result<(), InvocationError> {
        let BoundCommand {
            mut command,
            cancel,
        } = self.builder.build(&invocation, cancel);
        let label = invocation.label;

        match &invocation.output {
            Output::Log => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            Output::Files { stdout, stderr } => {
                command.stdout(self.log_file(stdout));
                command.stderr(self.log_file(stderr));
            }
        }

        debug!("Starting '{}'", label);

        let mut child = command.spawn().map_err(|source| InvocationError::Spawn {
            label: label.clone(),
            source,
        })?;

        let mut forwarders = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(self.forward_lines(&label, stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(self.forward_lines(&label, stderr));
        }

        let outcome = tokio::select! {
            status = child.wait() => status.map_err(|source| InvocationError::Wait {
                label: label.clone(),
                source,
            }),
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    self.log.warn(&format!("Failed to kill '{}': {}", label, e));
                }
                Err(InvocationError::Cancelled { label: label.clone() })
            }
        };

        // Grandchildren may still hold the pipes after a kill
        let cancelled = matches!(outcome, Err(InvocationError::Cancelled { .. }));
        for forwarder in forwarders {
            if cancelled {
                forwarder.abort();
            }
            match forwarder.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => self
                    .log
                    .warn(&format!("Output forwarding for '{}' failed: {}", label, e)),
            }
        }

        let status = outcome?;
        debug!("'{}' exited with {}", label, status);

        if status.success() {
            Ok(())
        } else {
            Err(InvocationError::Exit { label, status })
        }
    }
}
