//! Report State
//!
//! Immutable snapshot of a hub's report orchestration. A new snapshot is
//! derived only through [`ReportState::apply`]; the reducer enforces the job
//! invariants (progress never decreases, status only moves forward, the
//! dependent stage stays idle until the primary stage is done).
//! [`StateHandle`] publishes each snapshot to subscribers.

use crate::error::StageFailure;
use crate::report::aggregate::{DependentBundle, PrimaryBundle};
use crate::types::{HubId, JobId, JobKind, JobStatus, Progress, ReportJob};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryPhase {
    Idle,
    CheckingExisting,
    AwaitingQuota,
    Triggering,
    Polling,
    FetchingResult,
    Done,
    Failed,
}

impl PrimaryPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, PrimaryPhase::Done | PrimaryPhase::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependentPhase {
    Idle,
    CheckingApplicability,
    Polling,
    FetchingResult,
    Done,
    Failed,
}

impl DependentPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, DependentPhase::Done | DependentPhase::Failed)
    }
}

macro_rules! phase_display {
    ($($phase:ty),*) => {$(
        impl fmt::Display for $phase {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:?}", self)
            }
        }
    )*};
}

phase_display!(PrimaryPhase, DependentPhase);

fn failure_message<S: Serializer>(
    failure: &Option<StageFailure>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match failure {
        Some(f) => serializer.serialize_some(&f.to_string()),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PrimaryStage {
    pub phase: PrimaryPhase,
    pub job: ReportJob,
    pub bundle: Option<Arc<PrimaryBundle>>,
    #[serde(serialize_with = "failure_message")]
    pub failure: Option<StageFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependentStage {
    pub phase: DependentPhase,
    pub job: ReportJob,
    pub bundle: Option<Arc<DependentBundle>>,
    #[serde(serialize_with = "failure_message")]
    pub failure: Option<StageFailure>,
}

/// Every way a [`ReportState`] can change.
#[derive(Debug, Clone)]
pub enum Transition {
    PrimaryPhase(PrimaryPhase),
    /// A status report from the server for the primary job.
    PrimaryObserved {
        job_id: Option<JobId>,
        status: JobStatus,
        progress: Progress,
    },
    /// This client just triggered generation.
    PrimaryTriggered,
    PrimaryDone(Arc<PrimaryBundle>),
    PrimaryFailed(StageFailure),
    DependentPhase(DependentPhase),
    DependentObserved {
        job_id: Option<JobId>,
        status: JobStatus,
        progress: Progress,
    },
    DependentNotApplicable(Arc<DependentBundle>),
    DependentDone(Arc<DependentBundle>),
    DependentFailed(StageFailure),
}

impl Transition {
    fn kind(&self) -> JobKind {
        match self {
            Transition::PrimaryPhase(_)
            | Transition::PrimaryObserved { .. }
            | Transition::PrimaryTriggered
            | Transition::PrimaryDone(_)
            | Transition::PrimaryFailed(_) => JobKind::Primary,
            _ => JobKind::Dependent,
        }
    }
}

/// Snapshot of one hub's report orchestration.
#[derive(Debug, Clone, Serialize)]
pub struct ReportState {
    pub hub: HubId,
    pub primary: PrimaryStage,
    pub dependent: DependentStage,
    /// Actionable warning for the user, e.g. insufficient credits.
    pub warning: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Apply an observed status to a job, keeping the forward-only invariants.
fn observe(job: &ReportJob, job_id: Option<JobId>, status: JobStatus, progress: Progress) -> ReportJob {
    let mut next = job.clone();
    if let Some(id) = job_id {
        next.id = Some(id);
    }
    if job.status.can_advance_to(status, job.kind) {
        next.status = status;
    } else if job.status != status {
        debug!(
            kind = %job.kind,
            from = %job.status,
            to = %status,
            "Ignoring backwards status transition"
        );
    }
    next.progress = if matches!(next.status, JobStatus::Completed | JobStatus::NotApplicable) {
        Progress::COMPLETE
    } else {
        job.progress.advance(progress)
    };
    next
}

impl ReportState {
    pub fn new(hub: HubId) -> Self {
        Self {
            primary: PrimaryStage {
                phase: PrimaryPhase::Idle,
                job: ReportJob::new(hub.clone(), JobKind::Primary),
                bundle: None,
                failure: None,
            },
            dependent: DependentStage {
                phase: DependentPhase::Idle,
                job: ReportJob::new(hub.clone(), JobKind::Dependent),
                bundle: None,
                failure: None,
            },
            hub,
            warning: None,
            updated_at: Utc::now(),
        }
    }

    /// Derive the next snapshot. Transitions that would break an invariant
    /// leave the snapshot unchanged.
    pub fn apply(&self, transition: Transition) -> ReportState {
        if transition.kind() == JobKind::Primary && self.primary.phase.is_terminal() {
            debug!(hub_id = %self.hub, ?transition, "Primary stage settled, ignoring transition");
            return self.clone();
        }
        if transition.kind() == JobKind::Dependent
            && (self.primary.phase != PrimaryPhase::Done || self.dependent.phase.is_terminal())
        {
            debug!(hub_id = %self.hub, ?transition, "Dependent stage not open, ignoring transition");
            return self.clone();
        }

        let mut next = self.clone();
        next.updated_at = Utc::now();
        match transition {
            Transition::PrimaryPhase(phase) => {
                if !phase.is_terminal() {
                    next.primary.phase = phase;
                }
            }
            Transition::PrimaryObserved {
                job_id,
                status,
                progress,
            } => {
                next.primary.job = observe(&self.primary.job, job_id, status, progress);
            }
            Transition::PrimaryTriggered => {
                next.primary.job.progress = self.primary.job.progress.advance(Progress::TRIGGERED);
            }
            Transition::PrimaryDone(bundle) => {
                next.primary.job = observe(
                    &self.primary.job,
                    Some(bundle.job_id.clone()),
                    JobStatus::Completed,
                    Progress::COMPLETE,
                );
                next.primary.bundle = Some(bundle);
                next.primary.phase = PrimaryPhase::Done;
            }
            Transition::PrimaryFailed(failure) => {
                if failure.is_quota_warning() {
                    next.warning = Some(failure.user_message());
                }
                next.primary.failure = Some(failure);
                next.primary.phase = PrimaryPhase::Failed;
            }
            Transition::DependentPhase(phase) => {
                if !phase.is_terminal() {
                    next.dependent.phase = phase;
                }
            }
            Transition::DependentObserved {
                job_id,
                status,
                progress,
            } => {
                next.dependent.job = observe(&self.dependent.job, job_id, status, progress);
            }
            Transition::DependentNotApplicable(bundle) => {
                next.dependent.job = observe(
                    &self.dependent.job,
                    Some(bundle.job_id.clone()),
                    JobStatus::NotApplicable,
                    Progress::COMPLETE,
                );
                next.dependent.bundle = Some(bundle);
                next.dependent.phase = DependentPhase::Done;
            }
            Transition::DependentDone(bundle) => {
                next.dependent.job = observe(
                    &self.dependent.job,
                    Some(bundle.job_id.clone()),
                    JobStatus::Completed,
                    Progress::COMPLETE,
                );
                next.dependent.bundle = Some(bundle);
                next.dependent.phase = DependentPhase::Done;
            }
            Transition::DependentFailed(failure) => {
                next.dependent.failure = Some(failure);
                next.dependent.phase = DependentPhase::Failed;
            }
        }
        next
    }

    /// True once no further transition can change this snapshot.
    pub fn is_settled(&self) -> bool {
        self.primary.phase == PrimaryPhase::Failed
            || (self.primary.phase == PrimaryPhase::Done && self.dependent.phase.is_terminal())
    }
}

/// Publishes report snapshots to any number of subscribers.
#[derive(Debug, Clone)]
pub struct StateHandle {
    tx: Arc<watch::Sender<ReportState>>,
}

impl StateHandle {
    pub fn new(initial: ReportState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<ReportState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ReportState {
        self.tx.borrow().clone()
    }

    /// Replace the snapshot with the one derived from `transition`.
    pub fn dispatch(&self, transition: Transition) -> ReportState {
        self.tx.send_modify(|state| *state = state.apply(transition));
        self.snapshot()
    }

    pub fn reset(&self, state: ReportState) {
        self.tx.send_replace(state);
    }
}
