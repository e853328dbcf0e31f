//! Service layer
//!
//! Services contain the runner's business logic: running pipeline stages,
//! publishing job updates and recording job-scoped log messages.
//!
//! Collaborators are passed in as trait objects so tests can substitute
//! recording fakes.

mod job_log;
mod stages;
mod updates;

// Re-export traits
pub use job_log::JobLog;
pub use updates::JobUpdatePublisher;

// Re-export implementations
#[cfg(test)]
pub use job_log::InMemoryJobLog;
pub use job_log::TracingJobLog;
pub use stages::{StageError, StageExecutor};
pub use updates::{LogPublisher, StatusReporter};
