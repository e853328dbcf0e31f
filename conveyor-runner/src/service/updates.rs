//! Job update publishing
//!
//! Progress and terminal notifications go through a `JobUpdatePublisher`.
//! The HTTP client is used when an endpoint is configured; otherwise updates
//! are only logged.

use anyhow::Result;
use async_trait::async_trait;
use conveyor_client::{ClientError, UpdateClient};
use conveyor_core::domain::job::Job;
use conveyor_core::dto::update::{JobState, JobUpdate};
use std::sync::Arc;
use tracing::info;

use crate::service::JobLog;

/// Delivers job updates to whoever tracks job progress
#[async_trait]
pub trait JobUpdatePublisher: Send + Sync {
    async fn publish(&self, update: JobUpdate) -> Result<()>;
}

#[async_trait]
impl JobUpdatePublisher for UpdateClient {
    async fn publish(&self, update: JobUpdate) -> Result<()> {
        self.publish_job_update(&update)
            .await
            .map_err(|e| {
                let context = failure_context(&e, &update.invocation_id);
                anyhow::Error::new(e).context(context)
            })
    }
}

/// Describes a failed publish by which side of the exchange failed
fn failure_context(error: &ClientError, invocation_id: &str) -> String {
    if error.is_client_error() {
        format!("Update endpoint rejected the update for job {}", invocation_id)
    } else if error.is_server_error() {
        format!(
            "Update endpoint failed to handle the update for job {}",
            invocation_id
        )
    } else {
        format!("Failed to publish update for job {}", invocation_id)
    }
}

/// Publisher that only writes updates to the runner log
pub struct LogPublisher;

#[async_trait]
impl JobUpdatePublisher for LogPublisher {
    async fn publish(&self, update: JobUpdate) -> Result<()> {
        info!(
            job = update.invocation_id.as_str(),
            state = ?update.state,
            "{}",
            update.message
        );
        Ok(())
    }
}

/// Publishes updates for one job from one host
#[derive(Clone)]
pub struct StatusReporter {
    publisher: Arc<dyn JobUpdatePublisher>,
    job: Arc<Job>,
    host: String,
    log: Arc<dyn JobLog>,
}

impl StatusReporter {
    pub fn new(
        publisher: Arc<dyn JobUpdatePublisher>,
        job: Arc<Job>,
        host: impl Into<String>,
        log: Arc<dyn JobLog>,
    ) -> Self {
        Self {
            publisher,
            job,
            host: host.into(),
            log,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Publishes a progress message; failures are logged, not returned
    pub async fn running(&self, message: impl Into<String>) {
        let update = JobUpdate::new(&self.job, JobState::Running, message, &self.host);
        if let Err(e) = self.publisher.publish(update).await {
            self.log.error(&format!("{:#}", e));
        }
    }

    /// Publishes the terminal failure message
    pub async fn failure(&self, message: impl Into<String>) -> Result<()> {
        let update = JobUpdate::new(&self.job, JobState::Failed, message, &self.host);
        self.publisher.publish(update).await
    }

    /// Publishes the terminal success message
    pub async fn success(&self) -> Result<()> {
        let message = format!("Job {} completed successfully", self.job.invocation_id);
        let update = JobUpdate::new(&self.job, JobState::Completed, message, &self.host);
        self.publisher.publish(update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::InMemoryJobLog;
    use crate::testing::RecordingPublisher;
    use conveyor_core::domain::log::LogLevel;

    fn reporter(publisher: Arc<RecordingPublisher>, log: Arc<InMemoryJobLog>) -> StatusReporter {
        let job = Job {
            invocation_id: "inv-7".to_string(),
            ..Default::default()
        };
        StatusReporter::new(publisher, Arc::new(job), "node-3", log)
    }

    #[tokio::test]
    async fn test_states_and_sender() {
        let publisher = Arc::new(RecordingPublisher::new());
        let reporter = reporter(publisher.clone(), Arc::new(InMemoryJobLog::new()));

        reporter.running("pulling").await;
        reporter.failure("Job exited with a status of 4").await.unwrap();
        reporter.success().await.unwrap();

        let updates = publisher.updates();
        let states: Vec<JobState> = updates.iter().map(|u| u.state).collect();
        assert_eq!(
            states,
            vec![JobState::Running, JobState::Failed, JobState::Completed]
        );
        assert!(updates.iter().all(|u| u.sender == "node-3"));
        assert!(updates.iter().all(|u| u.invocation_id == "inv-7"));
        assert_eq!(updates[2].message, "Job inv-7 completed successfully");
    }

    #[tokio::test]
    async fn test_running_logs_publish_errors() {
        let publisher = Arc::new(RecordingPublisher::rejecting());
        let log = Arc::new(InMemoryJobLog::new());
        let reporter = reporter(publisher, log.clone());

        reporter.running("pulling").await;
        assert_eq!(log.messages(LogLevel::Error).len(), 1);
        assert!(reporter.success().await.is_err());
    }

    #[test]
    fn test_failure_context_by_status() {
        assert_eq!(
            failure_context(&ClientError::api_error(422, "bad state"), "inv-7"),
            "Update endpoint rejected the update for job inv-7"
        );
        assert_eq!(
            failure_context(&ClientError::api_error(503, "down"), "inv-7"),
            "Update endpoint failed to handle the update for job inv-7"
        );
        assert_eq!(
            failure_context(&ClientError::api_error(302, "moved"), "inv-7"),
            "Failed to publish update for job inv-7"
        );
    }

    #[tokio::test]
    async fn test_client_publish_failure_names_job() {
        let client = UpdateClient::new("http://127.0.0.1:1");
        let job = Job {
            invocation_id: "inv-9".to_string(),
            ..Default::default()
        };
        let update = JobUpdate::new(&job, JobState::Running, "hello", "host");

        let err = client.publish(update).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to publish update for job inv-9");
    }

    #[tokio::test]
    async fn test_log_publisher_accepts_updates() {
        let job = Job::default();
        let update = JobUpdate::new(&job, JobState::Running, "hello", "host");
        assert!(LogPublisher.publish(update).await.is_ok());
    }
}
