//! Job update endpoint

use crate::UpdateClient;
use crate::error::Result;
use conveyor_core::dto::update::JobUpdate;
use tracing::debug;

impl UpdateClient {
    /// URL that receives updates for one invocation
    pub fn updates_url(&self, invocation_id: &str) -> String {
        format!("{}/api/jobs/{}/updates", self.base_url, invocation_id)
    }

    /// Publish a job update
    ///
    /// # Arguments
    /// * `update` - The update to deliver
    pub async fn publish_job_update(&self, update: &JobUpdate) -> Result<()> {
        let url = self.updates_url(&update.invocation_id);
        debug!("Publishing {:?} update to {}", update.state, url);

        let response = self.client.post(&url).json(update).send().await?;

        self.handle_empty_response(response).await
    }
}
