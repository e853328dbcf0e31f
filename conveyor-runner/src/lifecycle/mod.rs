//! Job lifecycle
//!
//! This layer runs the job from start to terminal status and coordinates
//! how the process shuts down, whether the job finished on its own or was
//! stopped by a signal or the time limit.

pub mod exit;
pub mod job_runner;
pub mod signals;

pub use exit::{ComposeTeardown, ExitCoordinator};
pub use job_runner::JobRunner;
pub use signals::{spawn_signal_listener, spawn_time_limit};
