//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{ApiError, JobApiError};

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::Client(JobApiError::AuthFailed(_)) => format!(
            "{}\nCheck the session token (--session or HUB_AUDIT_SESSION).",
            e
        ),
        _ => e.to_string(),
    }
}

/// Result of a CLI command: text for stdout plus whether it succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub text: String,
    pub success: bool,
}

impl CommandOutput {
    pub fn ok(text: String) -> Self {
        Self {
            text,
            success: true,
        }
    }

    pub fn failed(text: String) -> Self {
        Self {
            text,
            success: false,
        }
    }
}
