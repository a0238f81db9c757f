//! Error types for the hub audit report client.

use crate::quota::DenyReason;
use crate::types::{BundleResource, HubId, JobId, JobKind};
use thiserror::Error;

/// Failure of a single call against the report job API.
///
/// Every variant is transient from the state machines' point of view: the
/// poll loop retries on its next tick instead of halting.
#[derive(Debug, Clone, Error)]
pub enum JobApiError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// One or more resources of a stage bundle could not be fetched.
#[derive(Debug, Clone, Error)]
#[error("Failed to fetch {kind} bundle for job {job_id}: {}", describe_failed(.failed))]
pub struct AggregationFailure {
    pub job_id: JobId,
    pub kind: JobKind,
    /// Every resource that failed, with the error message it failed with.
    pub failed: Vec<(BundleResource, String)>,
}

impl AggregationFailure {
    pub fn failed_resources(&self) -> Vec<BundleResource> {
        self.failed.iter().map(|(resource, _)| *resource).collect()
    }
}

fn describe_failed(failed: &[(BundleResource, String)]) -> String {
    failed
        .iter()
        .map(|(resource, error)| format!("{} ({})", resource, error))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Terminal reason a report stage halted in `Failed`.
#[derive(Debug, Clone, Error)]
pub enum StageFailure {
    #[error("Hub identifier is missing")]
    MissingHub,

    #[error("Report generation denied: {0}")]
    QuotaInsufficient(DenyReason),

    #[error("{0}")]
    Aggregation(#[from] AggregationFailure),

    #[error("A {kind} poll for hub {hub} is already running")]
    AlreadyPolling { hub: HubId, kind: JobKind },

    #[error("The {kind} poll for hub {hub} was released by another owner")]
    Superseded { hub: HubId, kind: JobKind },

    #[error("Gave up after {attempts} poll attempts")]
    AttemptsExhausted { attempts: u32 },

    #[error("Polling was cancelled")]
    Cancelled,
}

impl StageFailure {
    /// Message shown to the dashboard user.
    pub fn user_message(&self) -> String {
        match self {
            StageFailure::QuotaInsufficient(_) => {
                "Insufficient credits to generate a new report.".to_string()
            }
            StageFailure::AlreadyPolling { .. } => {
                "This report is already being refreshed.".to_string()
            }
            StageFailure::Cancelled => "Report refresh was stopped.".to_string(),
            StageFailure::MissingHub => "Select a hub to view its report.".to_string(),
            _ => "The report could not be loaded. Please try again later.".to_string(),
        }
    }

    /// True for the quota warning the user can act on.
    pub fn is_quota_warning(&self) -> bool {
        matches!(self, StageFailure::QuotaInsufficient(_))
    }
}

/// Crate-level errors for configuration and the command-line surface.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid hub identifier: {0:?}")]
    InvalidHub(String),

    #[error("Job API error: {0}")]
    Client(#[from] JobApiError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Serialization(err.to_string())
    }
}
