//! Job update messages

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::Job;

/// State reported in a job update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Running,
    Completed,
    Failed,
}

/// Progress or terminal notification for one job invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobUpdate {
    pub id: Uuid,
    pub invocation_id: String,
    pub state: JobState,
    pub message: String,
    /// Host the runner is executing on
    pub sender: String,
    pub sent_on: chrono::DateTime<chrono::Utc>,
}

impl JobUpdate {
    pub fn new(job: &Job, state: JobState, message: impl Into<String>, sender: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            invocation_id: job.invocation_id.clone(),
            state,
            message: message.into(),
            sender: sender.to_string(),
            sent_on: chrono::Utc::now(),
        }
    }
}
