//! Integration tests for the hub audit report client

mod orchestrator_flow;
mod test_utils;

pub use test_utils::*;
