//! Job log sink
//!
//! Job-scoped messages (phase failures, setup problems, child process
//! output) are written through a `JobLog` handed to each component at
//! construction. Production forwards them to `tracing`; tests capture them.

use conveyor_core::domain::log::LogLevel;
use tracing::{debug, error, info, warn};

#[cfg(test)]
use conveyor_core::domain::log::LogEntry;
#[cfg(test)]
use std::sync::Mutex;

/// Sink for job-scoped log messages
pub trait JobLog: Send + Sync {
    /// Records a message at the given level
    fn record(&self, level: LogLevel, message: &str);

    fn debug(&self, message: &str) {
        self.record(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.record(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.record(LogLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.record(LogLevel::Error, message);
    }
}

/// Job log that forwards to `tracing`, tagged with the invocation ID
pub struct TracingJobLog {
    invocation_id: String,
}

impl TracingJobLog {
    pub fn new(invocation_id: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
        }
    }
}

impl JobLog for TracingJobLog {
    fn record(&self, level: LogLevel, message: &str) {
        let job = self.invocation_id.as_str();
        match level {
            LogLevel::Debug => debug!(job = job, "{}", message),
            LogLevel::Info => info!(job = job, "{}", message),
            LogLevel::Warning => warn!(job = job, "{}", message),
            LogLevel::Error => error!(job = job, "{}", message),
        }
    }
}

/// In-memory job log used to assert on what components logged
#[cfg(test)]
#[derive(Default)]
pub struct InMemoryJobLog {
    buffer: Mutex<Vec<LogEntry>>,
}

#[cfg(test)]
impl InMemoryJobLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages recorded at `level`, oldest first
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.buffer
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.level == level)
            .map(|entry| entry.message.clone())
            .collect()
    }
}

#[cfg(test)]
impl JobLog for InMemoryJobLog {
    fn record(&self, level: LogLevel, message: &str) {
        self.buffer
            .lock()
            .unwrap()
            .push(LogEntry::now(level, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_log_filters_by_level() {
        let log = InMemoryJobLog::new();
        log.info("starting");
        log.error("pull failed");
        log.info("done");

        assert_eq!(log.messages(LogLevel::Info), vec!["starting", "done"]);
        assert_eq!(log.messages(LogLevel::Error), vec!["pull failed"]);
        assert!(log.messages(LogLevel::Warning).is_empty());
    }

    #[test]
    fn test_tracing_log_accepts_all_levels() {
        let log = TracingJobLog::new("inv-1");
        log.debug("d");
        log.info("i");
        log.warn("w");
        log.error("e");
    }
}
