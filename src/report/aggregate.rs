//! Result aggregation: fetch every resource of a completed stage concurrently.
//!
//! Each resource fetch resolves to its own `Result`. A bundle is only built
//! when all of them succeeded; otherwise the failure names every resource
//! that failed and nothing partial is handed out.

use crate::client::JobClient;
use crate::error::AggregationFailure;
use crate::types::{BundleResource, JobId, JobKind, Session};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Aggregated result of a completed primary job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrimaryBundle {
    pub job_id: JobId,
    pub detail: Value,
    pub graph: Value,
    pub scores: Value,
    pub fetched_at: DateTime<Utc>,
}

impl PrimaryBundle {
    pub fn new(job_id: JobId, detail: Value, graph: Value, scores: Value) -> Self {
        Self {
            job_id,
            detail,
            graph,
            scores,
            fetched_at: Utc::now(),
        }
    }
}

/// Aggregated result of the dependent job, or a placeholder when it cannot run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependentBundle {
    pub job_id: JobId,
    pub detail: Value,
    pub graph: Value,
    /// Set on placeholder bundles to explain why there is no data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl DependentBundle {
    pub fn new(job_id: JobId, detail: Value, graph: Value) -> Self {
        Self {
            job_id,
            detail,
            graph,
            note: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn not_applicable(job_id: JobId) -> Self {
        Self {
            job_id,
            detail: json!({}),
            graph: json!([]),
            note: Some(
                "The secondary report does not apply to this hub: its precondition is not met."
                    .to_string(),
            ),
            fetched_at: Utc::now(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.note.is_some()
    }
}

#[derive(Clone)]
pub struct ResultAggregator {
    client: Arc<dyn JobClient>,
}

impl ResultAggregator {
    pub fn new(client: Arc<dyn JobClient>) -> Self {
        Self { client }
    }

    pub async fn fetch_primary(
        &self,
        session: &Session,
        job_id: &JobId,
    ) -> Result<PrimaryBundle, AggregationFailure> {
        let mut resources = self.fetch_all(session, job_id, JobKind::Primary).await?;
        let mut take = |r: BundleResource| resources.remove(&r).unwrap_or(Value::Null);
        Ok(PrimaryBundle::new(
            job_id.clone(),
            take(BundleResource::PrimaryDetail),
            take(BundleResource::PrimaryGraph),
            take(BundleResource::PrimaryScores),
        ))
    }

    pub async fn fetch_dependent(
        &self,
        session: &Session,
        job_id: &JobId,
    ) -> Result<DependentBundle, AggregationFailure> {
        let mut resources = self.fetch_all(session, job_id, JobKind::Dependent).await?;
        let mut take = |r: BundleResource| resources.remove(&r).unwrap_or(Value::Null);
        Ok(DependentBundle::new(
            job_id.clone(),
            take(BundleResource::DependentDetail),
            take(BundleResource::DependentGraph),
        ))
    }

    async fn fetch_all(
        &self,
        session: &Session,
        job_id: &JobId,
        kind: JobKind,
    ) -> Result<HashMap<BundleResource, Value>, AggregationFailure> {
        let start = Instant::now();
        let resources = BundleResource::for_kind(kind);
        let results = join_all(resources.iter().map(|resource| async move {
            (
                *resource,
                self.client.fetch_resource(session, job_id, *resource).await,
            )
        }))
        .await;

        let mut fetched = HashMap::new();
        let mut failed = Vec::new();
        for (resource, result) in results {
            match result {
                Ok(value) => {
                    fetched.insert(resource, value);
                }
                Err(e) => {
                    warn!(
                        job_id = %job_id,
                        kind = %kind,
                        resource = %resource,
                        error = %e,
                        "Bundle resource fetch failed"
                    );
                    failed.push((resource, e.to_string()));
                }
            }
        }

        if !failed.is_empty() {
            return Err(AggregationFailure {
                job_id: job_id.clone(),
                kind,
                failed,
            });
        }

        info!(
            job_id = %job_id,
            kind = %kind,
            resources = fetched.len(),
            duration_ms = start.elapsed().as_millis(),
            "Bundle fetched"
        );
        Ok(fetched)
    }
}
