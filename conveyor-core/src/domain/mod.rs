//! Core domain types
//!
//! This module contains the structures the runner reads and reports on.
//! The job description is supplied from outside and is never mutated while
//! a job runs.

pub mod job;
pub mod log;
pub mod status;
