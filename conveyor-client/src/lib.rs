//! Conveyor update client
//!
//! A small HTTP client that delivers job updates to the notification
//! endpoint. The runner publishes every progress message and the final job
//! state through it.
//!
//! # Example
//!
//! ```no_run
//! use conveyor_client::UpdateClient;
//! use conveyor_core::domain::job::Job;
//! use conveyor_core::dto::update::{JobState, JobUpdate};
//!
//! # async fn example(job: Job) -> conveyor_client::Result<()> {
//! let client = UpdateClient::new("http://localhost:8080");
//! let update = JobUpdate::new(&job, JobState::Running, "pulling images", "node-1");
//! client.publish_job_update(&update).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
mod updates;

pub use error::{ClientError, Result};

use reqwest::Client;

/// HTTP client for the job update endpoint
#[derive(Debug, Clone)]
pub struct UpdateClient {
    /// Base URL of the notification service (e.g., "http://localhost:8080")
    base_url: String,
    client: Client,
}

impl UpdateClient {
    /// Create a new update client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the notification service
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new update client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the notification service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Handle a response that carries no body we care about
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = UpdateClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = UpdateClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_with_custom_client() {
        let client = UpdateClient::with_client("http://localhost:8080", Client::new());
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}
