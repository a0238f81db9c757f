//! Shared test utilities for integration tests
//!
//! Scripted job API responses plus serialized access to process environment
//! variables, so config tests running in parallel do not observe each other.

use hub_audit::client::{DependentStatus, JobStatusReport, PrimaryStatus, ScriptedJobClient};
use hub_audit::types::{Hub, HubId, JobId, JobKind, JobStatus, Progress, QuotaState};
use serde_json::json;
use std::sync::Mutex;

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Run `f` with the given environment variables set (or removed for `None`),
/// restoring the previous values afterwards.
pub fn with_env<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let saved: Vec<(String, Option<String>)> = vars
        .iter()
        .map(|(name, _)| (name.to_string(), std::env::var(name).ok()))
        .collect();

    for (name, value) in vars {
        match value {
            Some(value) => std::env::set_var(name, value),
            None => std::env::remove_var(name),
        }
    }

    let result = f();

    for (name, value) in saved {
        match value {
            Some(value) => std::env::set_var(&name, value),
            None => std::env::remove_var(&name),
        }
    }
    result
}

pub fn hub(id: &str) -> Hub {
    Hub::new(HubId::parse(id).unwrap())
}

pub fn primary(status: JobStatus, progress: u32, job: Option<&str>) -> PrimaryStatus {
    PrimaryStatus {
        status: status.into(),
        progress: Progress::new(progress),
        job_id: job.map(JobId::new),
        generation_required: false,
    }
}

pub fn generation_required() -> PrimaryStatus {
    PrimaryStatus {
        status: JobStatus::NotApplicable.into(),
        progress: Progress::NONE,
        job_id: None,
        generation_required: true,
    }
}

pub fn by_id(status: JobStatus, progress: u32) -> JobStatusReport {
    JobStatusReport {
        status: status.into(),
        progress: Progress::new(progress),
    }
}

pub fn dependent(status: JobStatus, progress: u32) -> DependentStatus {
    DependentStatus {
        status: status.into(),
        progress: Progress::new(progress),
        markers: Vec::new(),
        job_id: None,
    }
}

pub fn dependent_not_applicable() -> DependentStatus {
    DependentStatus {
        markers: vec!["not_applicable".to_string()],
        ..dependent(JobStatus::Pending, 0)
    }
}

pub fn quota(remaining: u64, total: u64) -> QuotaState {
    QuotaState { remaining, total }
}

/// A hub whose primary report already exists and whose dependent report
/// completes on the first check; both bundles are served.
pub fn completed_everything() -> ScriptedJobClient {
    ScriptedJobClient::new()
        .with_primary_status(Ok(primary(JobStatus::Completed, 100, Some("job-1"))))
        .with_bundle(JobKind::Primary, json!({"rows": [1, 2, 3]}))
        .with_dependent_status(Ok(dependent(JobStatus::Completed, 100)))
        .with_bundle(JobKind::Dependent, json!({"edges": []}))
}
