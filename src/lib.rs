//! Hub Audit: report orchestration client
//!
//! Ensures a hub has an up-to-date primary audit report on the remote job
//! system, triggering generation when needed and the credit quota allows,
//! then follows the dependent report to completion. Poll loops are
//! single-owner per hub and stage, cancellable, and publish immutable state
//! snapshots.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod logging;
pub mod quota;
pub mod report;
pub mod schedule;
pub mod session;
pub mod types;
