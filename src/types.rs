//! Core data model: hubs, report jobs, statuses, progress and quota snapshots.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier of a connected tenant account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HubId(String);

impl HubId {
    /// Parse a hub identifier, rejecting empty or whitespace-only input.
    pub fn parse(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Blank id for state that is not bound to a hub yet.
    pub fn unassigned() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for HubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier assigned by the remote job system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Primary,
    Dependent,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Primary => "primary",
            JobKind::Dependent => "dependent",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a report job.
///
/// Moves forward along `Pending -> InProgress -> Completed`, or to `Failed`
/// from any non-terminal state. `NotApplicable` is a terminal state reserved
/// for dependent jobs whose precondition was not met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    NotApplicable,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::NotApplicable => "not_applicable",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::NotApplicable
        )
    }

    fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::InProgress => 1,
            _ => 2,
        }
    }

    /// Whether a job of `kind` may move from `self` to `next`.
    pub fn can_advance_to(self, next: JobStatus, kind: JobKind) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        match next {
            JobStatus::Failed => true,
            JobStatus::NotApplicable => kind == JobKind::Dependent,
            _ => next.rank() >= self.rank(),
        }
    }

    /// Parse a server status string, tolerating case and separator variations.
    pub fn parse(raw: &str) -> Option<JobStatus> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "pending" | "queued" => Some(JobStatus::Pending),
            "in_progress" | "inprogress" | "running" => Some(JobStatus::InProgress),
            "completed" | "complete" | "done" => Some(JobStatus::Completed),
            "failed" | "error" => Some(JobStatus::Failed),
            "not_applicable" | "notapplicable" => Some(JobStatus::NotApplicable),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status exactly as the server reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum ReportedStatus {
    Known(JobStatus),
    Unrecognized(String),
}

impl ReportedStatus {
    pub fn known(&self) -> Option<JobStatus> {
        match self {
            ReportedStatus::Known(status) => Some(*status),
            ReportedStatus::Unrecognized(_) => None,
        }
    }
}

impl From<&str> for ReportedStatus {
    fn from(raw: &str) -> Self {
        match JobStatus::parse(raw) {
            Some(status) => ReportedStatus::Known(status),
            None => ReportedStatus::Unrecognized(raw.to_string()),
        }
    }
}

impl From<JobStatus> for ReportedStatus {
    fn from(status: JobStatus) -> Self {
        ReportedStatus::Known(status)
    }
}

impl From<ReportedStatus> for String {
    fn from(status: ReportedStatus) -> Self {
        match status {
            ReportedStatus::Known(status) => status.as_str().to_string(),
            ReportedStatus::Unrecognized(raw) => raw,
        }
    }
}

impl<'de> Deserialize<'de> for ReportedStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ReportedStatus::from(raw.as_str()))
    }
}

impl fmt::Display for ReportedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportedStatus::Known(status) => write!(f, "{}", status),
            ReportedStatus::Unrecognized(raw) => write!(f, "{} (unrecognized)", raw),
        }
    }
}

/// Completion percentage, always within 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(transparent)]
pub struct Progress(u8);

impl Progress {
    pub const NONE: Progress = Progress(0);
    /// Optimistic value published right after this client triggered generation.
    pub const TRIGGERED: Progress = Progress(2);
    pub const COMPLETE: Progress = Progress(100);

    pub fn new(value: u32) -> Self {
        Self(value.min(100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Fold a server-reported value in without ever going backwards.
    pub fn advance(self, reported: Progress) -> Progress {
        self.max(reported)
    }
}

// Servers report fractional and out-of-range values; clamp instead of rejecting.
impl<'de> Deserialize<'de> for Progress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        if raw.is_nan() || raw <= 0.0 {
            return Ok(Progress::NONE);
        }
        Ok(Progress::new(raw.round().min(100.0) as u32))
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// One computation instance on the remote job system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportJob {
    pub id: Option<JobId>,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: Progress,
    pub hub: HubId,
}

impl ReportJob {
    pub fn new(hub: HubId, kind: JobKind) -> Self {
        Self {
            id: None,
            kind,
            status: JobStatus::Pending,
            progress: Progress::NONE,
            hub,
        }
    }
}

/// A connected tenant account.
///
/// The job references are whatever this client last saw and may be stale
/// relative to the server. They only fill in for job ids the server omits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hub {
    pub id: HubId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub primary_job: Option<JobId>,
    #[serde(default)]
    pub dependent_job: Option<JobId>,
}

impl Hub {
    pub fn new(id: HubId) -> Self {
        Self {
            id,
            name: None,
            primary_job: None,
            dependent_job: None,
        }
    }

    pub fn with_primary_job(mut self, job: JobId) -> Self {
        self.primary_job = Some(job);
        self
    }

    pub fn with_dependent_job(mut self, job: JobId) -> Self {
        self.dependent_job = Some(job);
        self
    }
}

/// Resource credits available to the acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    pub remaining: u64,
    pub total: u64,
}

/// A single resource belonging to a stage's result bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleResource {
    PrimaryDetail,
    PrimaryGraph,
    PrimaryScores,
    DependentDetail,
    DependentGraph,
}

impl BundleResource {
    pub const PRIMARY: [BundleResource; 3] = [
        BundleResource::PrimaryDetail,
        BundleResource::PrimaryGraph,
        BundleResource::PrimaryScores,
    ];
    pub const DEPENDENT: [BundleResource; 2] =
        [BundleResource::DependentDetail, BundleResource::DependentGraph];

    pub fn for_kind(kind: JobKind) -> &'static [BundleResource] {
        match kind {
            JobKind::Primary => &Self::PRIMARY,
            JobKind::Dependent => &Self::DEPENDENT,
        }
    }

    pub fn kind(self) -> JobKind {
        match self {
            BundleResource::PrimaryDetail
            | BundleResource::PrimaryGraph
            | BundleResource::PrimaryScores => JobKind::Primary,
            BundleResource::DependentDetail | BundleResource::DependentGraph => {
                JobKind::Dependent
            }
        }
    }

    /// Path segment used by the HTTP client.
    pub fn path(self) -> &'static str {
        match self {
            BundleResource::PrimaryDetail => "detail",
            BundleResource::PrimaryGraph => "graph",
            BundleResource::PrimaryScores => "scores",
            BundleResource::DependentDetail => "dependent/detail",
            BundleResource::DependentGraph => "dependent/graph",
        }
    }
}

impl fmt::Display for BundleResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Session credential carried on every job API call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session(String);

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Session(***)")
    }
}
