//! Job status codes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a job or of one of its phases
///
/// The numeric value is reported upstream and used as the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum StatusCode {
    Success = 0,
    DockerPullFailed = 1,
    DockerCreateFailed = 2,
    InputFailed = 3,
    StepFailed = 4,
    OutputFailed = 5,
    /// The runner was interrupted by a signal
    Killed = 6,
    /// The job exceeded its time limit
    TimeLimit = 7,
}

impl StatusCode {
    pub fn is_success(self) -> bool {
        self == StatusCode::Success
    }

    /// Numeric code, suitable for `std::process::exit`
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::DockerPullFailed => "docker_pull_failed",
            Self::DockerCreateFailed => "docker_create_failed",
            Self::InputFailed => "input_failed",
            Self::StepFailed => "step_failed",
            Self::OutputFailed => "output_failed",
            Self::Killed => "killed",
            Self::TimeLimit => "time_limit",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
