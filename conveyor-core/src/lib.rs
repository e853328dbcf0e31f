//! Conveyor Core
//!
//! Core types shared by the Conveyor job runner and its update client.
//!
//! This crate contains:
//! - Domain types: the job description, status codes and log records
//! - DTOs: messages published to the notification endpoint

pub mod domain;
pub mod dto;
