//! Forced termination sources
//!
//! Signals and the optional time limit cancel the running job and report
//! a status on the exit channel.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use conveyor_core::domain::status::StatusCode;

/// Listens for SIGINT, SIGTERM and SIGQUIT
pub fn spawn_signal_listener(
    cancel: CancellationToken,
    exit: mpsc::Sender<StatusCode>,
) -> Result<JoinHandle<()>> {
    let mut interrupt = signal(SignalKind::interrupt()).context("Failed to listen for SIGINT")?;
    let mut terminate = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
    let mut quit = signal(SignalKind::quit()).context("Failed to listen for SIGQUIT")?;

    Ok(tokio::spawn(async move {
        let name = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
            _ = quit.recv() => "SIGQUIT",
        };

        warn!("Received {}, stopping the job", name);
        cancel.cancel();
        if exit.send(StatusCode::Killed).await.is_err() {
            warn!("Shutdown already in progress, ignoring {}", name);
        }
    }))
}

/// Cancels the job once `limit` has elapsed
///
/// Returns quietly if the job is cancelled for another reason first.
pub fn spawn_time_limit(
    limit: Duration,
    cancel: CancellationToken,
    exit: mpsc::Sender<StatusCode>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(limit) => {
                warn!("Job exceeded its time limit of {:?}", limit);
                cancel.cancel();
                if exit.send(StatusCode::TimeLimit).await.is_err() {
                    warn!("Shutdown already in progress, ignoring time limit");
                }
            }
            _ = cancel.cancelled() => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_time_limit_cancels_and_reports() {
        let cancel = CancellationToken::new();
        let (exit_tx, mut exit_rx) = mpsc::channel(1);

        spawn_time_limit(Duration::from_millis(20), cancel.clone(), exit_tx)
            .await
            .unwrap();

        assert!(cancel.is_cancelled());
        assert_eq!(exit_rx.recv().await, Some(StatusCode::TimeLimit));
    }

    #[tokio::test]
    async fn test_time_limit_stands_down_on_cancel() {
        let cancel = CancellationToken::new();
        let (exit_tx, mut exit_rx) = mpsc::channel(1);
        cancel.cancel();

        spawn_time_limit(Duration::from_secs(60), cancel, exit_tx)
            .await
            .unwrap();

        assert_eq!(exit_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_signal_listener_installs() {
        let (exit_tx, _exit_rx) = mpsc::channel(1);
        let handle = spawn_signal_listener(CancellationToken::new(), exit_tx).unwrap();
        handle.abort();
    }
}
