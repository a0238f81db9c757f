//! In-process [`JobClient`] serving scripted responses.
//!
//! Each operation has its own response queue. Responses are consumed in
//! order; the last one sticks, so a long poll keeps seeing the final answer.
//! Every call is recorded with the (tokio) instant it was made.

use super::{DependentStatus, JobClient, JobStatusReport, PrimaryStatus, TriggerResponse};
use crate::error::JobApiError;
use crate::types::{BundleResource, HubId, JobId, JobKind, QuotaState, Session};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tokio::time::Instant;

/// A call received by [`ScriptedJobClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCall {
    CheckPrimaryStatus { hub: HubId, session: String },
    TriggerPrimaryGeneration { hub: HubId, session: String },
    CheckPrimaryStatusById { job_id: JobId, hub: HubId, session: String },
    CheckDependentStatus { primary_job: JobId, session: String },
    CheckQuota { session: String },
    FetchResource { job_id: JobId, resource: BundleResource, session: String },
}

impl ClientCall {
    /// True for calls that ask the server about a job of `kind`.
    pub fn is_status_check(&self, kind: JobKind) -> bool {
        match kind {
            JobKind::Primary => matches!(
                self,
                ClientCall::CheckPrimaryStatus { .. } | ClientCall::CheckPrimaryStatusById { .. }
            ),
            JobKind::Dependent => matches!(self, ClientCall::CheckDependentStatus { .. }),
        }
    }

    pub fn session(&self) -> &str {
        match self {
            ClientCall::CheckPrimaryStatus { session, .. }
            | ClientCall::TriggerPrimaryGeneration { session, .. }
            | ClientCall::CheckPrimaryStatusById { session, .. }
            | ClientCall::CheckDependentStatus { session, .. }
            | ClientCall::CheckQuota { session }
            | ClientCall::FetchResource { session, .. } => session,
        }
    }
}

struct Script<T> {
    responses: VecDeque<Result<T, JobApiError>>,
}

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self {
            responses: VecDeque::new(),
        }
    }

    fn push(&mut self, response: Result<T, JobApiError>) {
        self.responses.push_back(response);
    }

    fn next(&mut self, operation: &str) -> Result<T, JobApiError> {
        if self.responses.len() > 1 {
            if let Some(response) = self.responses.pop_front() {
                return response;
            }
        }
        self.responses.front().cloned().unwrap_or_else(|| {
            Err(JobApiError::NotFound(format!(
                "no scripted response for {}",
                operation
            )))
        })
    }
}

struct ScriptState {
    primary_status: Script<PrimaryStatus>,
    trigger: Script<TriggerResponse>,
    primary_by_id: Script<JobStatusReport>,
    dependent_status: Script<DependentStatus>,
    quota: Script<QuotaState>,
    resources: HashMap<BundleResource, Script<Value>>,
    calls: Vec<(Instant, ClientCall)>,
}

/// Scripted job client for tests and offline runs.
pub struct ScriptedJobClient {
    state: Mutex<ScriptState>,
}

impl Default for ScriptedJobClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedJobClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScriptState {
                primary_status: Script::new(),
                trigger: Script::new(),
                primary_by_id: Script::new(),
                dependent_status: Script::new(),
                quota: Script::new(),
                resources: HashMap::new(),
                calls: Vec::new(),
            }),
        }
    }

    pub fn with_primary_status(self, response: Result<PrimaryStatus, JobApiError>) -> Self {
        self.state.lock().primary_status.push(response);
        self
    }

    pub fn with_trigger(self, response: Result<TriggerResponse, JobApiError>) -> Self {
        self.state.lock().trigger.push(response);
        self
    }

    pub fn with_primary_status_by_id(
        self,
        response: Result<JobStatusReport, JobApiError>,
    ) -> Self {
        self.push_primary_status_by_id(response);
        self
    }

    pub fn with_dependent_status(self, response: Result<DependentStatus, JobApiError>) -> Self {
        self.state.lock().dependent_status.push(response);
        self
    }

    pub fn with_quota(self, response: Result<QuotaState, JobApiError>) -> Self {
        self.state.lock().quota.push(response);
        self
    }

    pub fn with_resource(
        self,
        resource: BundleResource,
        response: Result<Value, JobApiError>,
    ) -> Self {
        self.state
            .lock()
            .resources
            .entry(resource)
            .or_insert_with(Script::new)
            .push(response);
        self
    }

    /// Serve the same payload for every resource of a stage.
    pub fn with_bundle(mut self, kind: JobKind, payload: Value) -> Self {
        for resource in BundleResource::for_kind(kind) {
            self = self.with_resource(*resource, Ok(payload.clone()));
        }
        self
    }

    pub fn push_primary_status_by_id(&self, response: Result<JobStatusReport, JobApiError>) {
        self.state.lock().primary_by_id.push(response);
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<ClientCall> {
        self.state
            .lock()
            .calls
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    /// Calls received so far with the instant each was made.
    pub fn timeline(&self) -> Vec<(Instant, ClientCall)> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&ClientCall) -> bool) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(_, call)| predicate(call))
            .count()
    }

    pub fn trigger_count(&self) -> usize {
        self.count(|c| matches!(c, ClientCall::TriggerPrimaryGeneration { .. }))
    }

    pub fn fetch_count(&self, kind: JobKind) -> usize {
        self.count(|c| matches!(c, ClientCall::FetchResource { resource, .. } if resource.kind() == kind))
    }

    fn record(&self, call: ClientCall) {
        self.state.lock().calls.push((Instant::now(), call));
    }
}

#[async_trait]
impl JobClient for ScriptedJobClient {
    async fn check_primary_status(
        &self,
        session: &Session,
        hub: &HubId,
    ) -> Result<PrimaryStatus, JobApiError> {
        self.record(ClientCall::CheckPrimaryStatus {
            hub: hub.clone(),
            session: session.token().to_string(),
        });
        self.state.lock().primary_status.next("check_primary_status")
    }

    async fn trigger_primary_generation(
        &self,
        session: &Session,
        hub: &HubId,
    ) -> Result<TriggerResponse, JobApiError> {
        self.record(ClientCall::TriggerPrimaryGeneration {
            hub: hub.clone(),
            session: session.token().to_string(),
        });
        self.state.lock().trigger.next("trigger_primary_generation")
    }

    async fn check_primary_status_by_id(
        &self,
        session: &Session,
        job_id: &JobId,
        hub: &HubId,
    ) -> Result<JobStatusReport, JobApiError> {
        self.record(ClientCall::CheckPrimaryStatusById {
            job_id: job_id.clone(),
            hub: hub.clone(),
            session: session.token().to_string(),
        });
        self.state
            .lock()
            .primary_by_id
            .next("check_primary_status_by_id")
    }

    async fn check_dependent_status(
        &self,
        session: &Session,
        primary_job: &JobId,
    ) -> Result<DependentStatus, JobApiError> {
        self.record(ClientCall::CheckDependentStatus {
            primary_job: primary_job.clone(),
            session: session.token().to_string(),
        });
        self.state
            .lock()
            .dependent_status
            .next("check_dependent_status")
    }

    async fn check_quota(&self, session: &Session) -> Result<QuotaState, JobApiError> {
        self.record(ClientCall::CheckQuota {
            session: session.token().to_string(),
        });
        self.state.lock().quota.next("check_quota")
    }

    async fn fetch_resource(
        &self,
        session: &Session,
        job_id: &JobId,
        resource: BundleResource,
    ) -> Result<Value, JobApiError> {
        self.record(ClientCall::FetchResource {
            job_id: job_id.clone(),
            resource,
            session: session.token().to_string(),
        });
        let mut state = self.state.lock();
        match state.resources.get_mut(&resource) {
            Some(script) => script.next(resource.path()),
            None => Err(JobApiError::NotFound(format!(
                "no scripted response for {}",
                resource
            ))),
        }
    }
}
