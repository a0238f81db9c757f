//! Report Job API Client
//!
//! The remote job system is an external collaborator: the orchestrator only
//! consumes it through [`JobClient`]. [`HttpJobClient`] speaks the JSON
//! transport; [`ScriptedJobClient`] serves canned responses in-process.

use crate::config::ClientConfig;
use crate::error::JobApiError;
use crate::types::{BundleResource, HubId, JobId, Progress, QuotaState, ReportedStatus, Session};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub mod scripted;

pub use scripted::{ClientCall, ScriptedJobClient};

/// Marker the server puts on a dependent status when the computation cannot run.
pub const NOT_APPLICABLE_MARKER: &str = "not_applicable";

/// Answer to "does this hub have a report, and must a new one be generated?"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryStatus {
    pub status: ReportedStatus,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default)]
    pub job_id: Option<JobId>,
    #[serde(default)]
    pub generation_required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerResponse {
    #[serde(default)]
    pub new_session: Option<Session>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub status: ReportedStatus,
    #[serde(default)]
    pub progress: Progress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentStatus {
    pub status: ReportedStatus,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default)]
    pub markers: Vec<String>,
    /// Identifier of the dependent job, when the server assigns a separate one.
    #[serde(default)]
    pub job_id: Option<JobId>,
}

impl DependentStatus {
    pub fn is_not_applicable(&self) -> bool {
        self.markers
            .iter()
            .any(|m| m.trim().eq_ignore_ascii_case(NOT_APPLICABLE_MARKER))
    }
}

/// Remote job API consumed by the report orchestrator.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Latest primary job for a hub and whether a new one must be generated.
    async fn check_primary_status(
        &self,
        session: &Session,
        hub: &HubId,
    ) -> Result<PrimaryStatus, JobApiError>;

    /// Start primary report generation. Not idempotent on the server.
    async fn trigger_primary_generation(
        &self,
        session: &Session,
        hub: &HubId,
    ) -> Result<TriggerResponse, JobApiError>;

    async fn check_primary_status_by_id(
        &self,
        session: &Session,
        job_id: &JobId,
        hub: &HubId,
    ) -> Result<JobStatusReport, JobApiError>;

    /// Dependent report status, keyed by the completed primary job.
    async fn check_dependent_status(
        &self,
        session: &Session,
        primary_job: &JobId,
    ) -> Result<DependentStatus, JobApiError>;

    async fn check_quota(&self, session: &Session) -> Result<QuotaState, JobApiError>;

    /// Fetch one resource of a completed job's result bundle.
    async fn fetch_resource(
        &self,
        session: &Session,
        job_id: &JobId,
        resource: BundleResource,
    ) -> Result<Value, JobApiError>;
}

fn map_http_error(error: reqwest::Error) -> JobApiError {
    if let Some(status) = error.status() {
        map_status(status.as_u16(), error.to_string())
    } else if error.is_timeout() {
        JobApiError::Transport(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        JobApiError::Transport(format!("Connection error: {}", error))
    } else if error.is_decode() {
        JobApiError::InvalidResponse(error.to_string())
    } else {
        JobApiError::Transport(format!("HTTP error: {}", error))
    }
}

fn map_status(status: u16, detail: String) -> JobApiError {
    match status {
        401 | 403 => JobApiError::AuthFailed(detail),
        404 => JobApiError::NotFound(detail),
        429 => JobApiError::RateLimited(detail),
        _ => JobApiError::RequestFailed(format!("status {}: {}", status, detail)),
    }
}

/// JSON-over-HTTP implementation of [`JobClient`].
pub struct HttpJobClient {
    client: Client,
    base_url: String,
}

impl HttpJobClient {
    pub fn new(config: &ClientConfig) -> Result<Self, JobApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| JobApiError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, builder: RequestBuilder, session: &Session) -> RequestBuilder {
        builder
            .bearer_auth(session.token())
            .header("Accept", "application/json")
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        session: &Session,
        path: &str,
    ) -> Result<T, JobApiError> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let response = self
            .authorized(self.client.get(&url), session)
            .send()
            .await
            .map_err(map_http_error)?;
        Self::decode(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        session: &Session,
        path: &str,
    ) -> Result<T, JobApiError> {
        let url = self.url(path);
        debug!(url = %url, "POST");
        let response = self
            .authorized(self.client.post(&url), session)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(map_http_error)?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, JobApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status(status.as_u16(), body));
        }
        response
            .json()
            .await
            .map_err(|e| JobApiError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl JobClient for HttpJobClient {
    async fn check_primary_status(
        &self,
        session: &Session,
        hub: &HubId,
    ) -> Result<PrimaryStatus, JobApiError> {
        self.get_json(session, &format!("hubs/{}/report/status", hub))
            .await
    }

    async fn trigger_primary_generation(
        &self,
        session: &Session,
        hub: &HubId,
    ) -> Result<TriggerResponse, JobApiError> {
        self.post_json(session, &format!("hubs/{}/report/generate", hub))
            .await
    }

    async fn check_primary_status_by_id(
        &self,
        session: &Session,
        job_id: &JobId,
        hub: &HubId,
    ) -> Result<JobStatusReport, JobApiError> {
        self.get_json(session, &format!("hubs/{}/report/jobs/{}/status", hub, job_id))
            .await
    }

    async fn check_dependent_status(
        &self,
        session: &Session,
        primary_job: &JobId,
    ) -> Result<DependentStatus, JobApiError> {
        self.get_json(session, &format!("reports/{}/dependent/status", primary_job))
            .await
    }

    async fn check_quota(&self, session: &Session) -> Result<QuotaState, JobApiError> {
        self.get_json(session, "account/quota").await
    }

    async fn fetch_resource(
        &self,
        session: &Session,
        job_id: &JobId,
        resource: BundleResource,
    ) -> Result<Value, JobApiError> {
        self.get_json(session, &format!("reports/{}/{}", job_id, resource.path()))
            .await
    }
}
