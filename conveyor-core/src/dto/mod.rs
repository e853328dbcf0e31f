//! Data Transfer Objects
//!
//! Messages the runner sends to the notification endpoint.

pub mod update;
