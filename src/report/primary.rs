//! Primary report state machine.
//!
//! `Idle -> CheckingExisting -> AwaitingQuota -> Triggering -> Polling ->
//! FetchingResult -> Done`, with `Failed` reachable from every non-terminal
//! step. An existing pending job skips straight to `Polling`; an existing
//! completed job skips straight to `FetchingResult`.

use crate::client::PrimaryStatus;
use crate::error::StageFailure;
use crate::guard::PollLease;
use crate::quota::{QuotaDecision, QuotaGate};
use crate::report::state::{PrimaryPhase, Transition};
use crate::report::StageContext;
use crate::schedule::{PollSchedule, Tick};
use crate::session::TriggerLatch;
use crate::types::{Hub, HubId, JobId, JobKind, JobStatus, Progress, ReportedStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Proof that a hub's primary report completed and its bundle was fetched.
///
/// Only the primary state machine can produce one, and the dependent state
/// machine cannot start without it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPrimary {
    hub: HubId,
    job_id: JobId,
    dependent_job: Option<JobId>,
}

impl CompletedPrimary {
    pub fn hub(&self) -> &HubId {
        &self.hub
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// The hub's dependent job reference, kept only when it belongs to this
    /// primary job.
    pub fn dependent_job(&self) -> Option<&JobId> {
        self.dependent_job.as_ref()
    }
}

enum Step {
    CheckingExisting,
    AwaitingQuota,
    Triggering,
    Polling { job_id: Option<JobId> },
    FetchingResult(JobId),
    Done(CompletedPrimary),
    Failed(StageFailure),
}

impl Step {
    fn phase(&self) -> PrimaryPhase {
        match self {
            Step::CheckingExisting => PrimaryPhase::CheckingExisting,
            Step::AwaitingQuota => PrimaryPhase::AwaitingQuota,
            Step::Triggering => PrimaryPhase::Triggering,
            Step::Polling { .. } => PrimaryPhase::Polling,
            Step::FetchingResult(_) => PrimaryPhase::FetchingResult,
            Step::Done(_) => PrimaryPhase::Done,
            Step::Failed(_) => PrimaryPhase::Failed,
        }
    }
}

/// One primary status answer, whichever endpoint served it.
struct Observed {
    job_id: Option<JobId>,
    status: ReportedStatus,
    progress: Progress,
    /// The hub still asks for generation, so the answer predates the trigger.
    previous_report: bool,
}

/// What to do after a tick that did not come due.
fn halt_on(tick: Tick) -> Option<StageFailure> {
    match tick {
        Tick::Due(_) => None,
        Tick::Cancelled => Some(StageFailure::Cancelled),
        Tick::Exhausted(attempts) => Some(StageFailure::AttemptsExhausted { attempts }),
    }
}

pub struct PrimaryPoller<'a> {
    ctx: &'a StageContext,
    trigger: &'a TriggerLatch,
    quota: QuotaGate,
}

impl<'a> PrimaryPoller<'a> {
    pub fn new(ctx: &'a StageContext, trigger: &'a TriggerLatch) -> Self {
        Self {
            ctx,
            trigger,
            quota: QuotaGate::new(),
        }
    }

    /// Drive the primary stage to `Done` or `Failed`.
    pub async fn run(&self, hub: &Hub) -> Result<CompletedPrimary, StageFailure> {
        let mut schedule = self.ctx.schedule();
        let mut step = if hub.id.is_blank() {
            Step::Failed(StageFailure::MissingHub)
        } else {
            Step::CheckingExisting
        };

        loop {
            let phase = step.phase();
            if !phase.is_terminal() {
                self.ctx.state.dispatch(Transition::PrimaryPhase(phase));
                info!(hub_id = %hub.id, kind = %JobKind::Primary, phase = %phase, "Primary stage transition");
            }

            step = match step {
                Step::CheckingExisting => self.check_existing(hub, &mut schedule).await,
                Step::AwaitingQuota => self.await_quota().await,
                Step::Triggering => self.trigger_generation(&hub.id, &mut schedule).await,
                Step::Polling { job_id } => {
                    match self.ctx.guard.try_acquire(&hub.id, JobKind::Primary) {
                        Some(lease) => self.poll(&hub.id, job_id, &lease, &mut schedule).await,
                        None => Step::Failed(StageFailure::AlreadyPolling {
                            hub: hub.id.clone(),
                            kind: JobKind::Primary,
                        }),
                    }
                }
                Step::FetchingResult(job_id) => self.fetch_result(hub, job_id).await,
                Step::Done(completed) => {
                    info!(hub_id = %hub.id, job_id = %completed.job_id, "Primary report ready");
                    return Ok(completed);
                }
                Step::Failed(failure) => {
                    warn!(hub_id = %hub.id, error = %failure, "Primary stage failed");
                    self.ctx
                        .state
                        .dispatch(Transition::PrimaryFailed(failure.clone()));
                    return Err(failure);
                }
            };
        }
    }

    async fn check_existing(&self, hub: &Hub, schedule: &mut PollSchedule) -> Step {
        loop {
            let session = self.ctx.session.current();
            match self.ctx.client.check_primary_status(&session, &hub.id).await {
                Ok(status) => return self.branch_existing(hub, status),
                Err(e) => {
                    warn!(hub_id = %hub.id, error = %e, "Primary status check failed, retrying next tick");
                    if let Some(failure) = halt_on(schedule.next_tick().await) {
                        return Step::Failed(failure);
                    }
                }
            }
        }
    }

    fn branch_existing(&self, hub: &Hub, status: PrimaryStatus) -> Step {
        if status.generation_required {
            return self.generation_needed();
        }
        // The hub's own job reference covers a status that omits the id.
        let job_id = match (&status.job_id, &hub.primary_job) {
            (Some(fresh), known) => {
                if let Some(known) = known.as_ref().filter(|known| *known != fresh) {
                    debug!(hub_id = %hub.id, stale = %known, fresh = %fresh, "Hub job reference was stale");
                }
                fresh.clone()
            }
            (None, Some(known)) => {
                debug!(hub_id = %hub.id, job_id = %known, "Status carried no job id, using the hub's job reference");
                known.clone()
            }
            (None, None) => return self.generation_needed(),
        };

        match &status.status {
            ReportedStatus::Known(JobStatus::Completed) => {
                self.observe(Some(job_id.clone()), JobStatus::Completed, status.progress);
                Step::FetchingResult(job_id)
            }
            ReportedStatus::Known(s @ (JobStatus::Pending | JobStatus::InProgress)) => {
                self.observe(Some(job_id.clone()), *s, status.progress);
                Step::Polling {
                    job_id: Some(job_id),
                }
            }
            ReportedStatus::Known(other) => {
                debug!(job_id = %job_id, status = %other, "Existing job is not usable");
                self.generation_needed()
            }
            ReportedStatus::Unrecognized(raw) => {
                warn!(job_id = %job_id, status = %raw, "Unrecognized status, treating as pending");
                self.observe(Some(job_id.clone()), JobStatus::Pending, status.progress);
                Step::Polling {
                    job_id: Some(job_id),
                }
            }
        }
    }

    fn generation_needed(&self) -> Step {
        if self.trigger.has_fired() {
            debug!("Generation already triggered by this orchestrator, polling instead");
            Step::Polling { job_id: None }
        } else {
            Step::AwaitingQuota
        }
    }

    async fn await_quota(&self) -> Step {
        let session = self.ctx.session.current();
        match self.quota.check(self.ctx.client.as_ref(), &session).await {
            QuotaDecision::Allowed(_) => Step::Triggering,
            QuotaDecision::Denied(reason) => Step::Failed(StageFailure::QuotaInsufficient(reason)),
        }
    }

    async fn trigger_generation(&self, hub: &HubId, schedule: &mut PollSchedule) -> Step {
        if !self.trigger.try_fire() {
            return Step::Polling { job_id: None };
        }
        let session = self.ctx.session.current();
        match self
            .ctx
            .client
            .trigger_primary_generation(&session, hub)
            .await
        {
            Ok(response) => {
                if let Some(new_session) = response.new_session {
                    self.ctx.session.replace(new_session);
                }
                self.ctx.state.dispatch(Transition::PrimaryTriggered);
                info!(hub_id = %hub, progress = %Progress::TRIGGERED, "Primary generation triggered");
                Step::Polling { job_id: None }
            }
            Err(e) => {
                self.trigger.release_unfired();
                warn!(hub_id = %hub, error = %e, "Trigger failed, re-checking next tick");
                match halt_on(schedule.next_tick().await) {
                    Some(failure) => Step::Failed(failure),
                    None => Step::CheckingExisting,
                }
            }
        }
    }

    async fn poll(
        &self,
        hub: &HubId,
        mut job_id: Option<JobId>,
        lease: &PollLease,
        schedule: &mut PollSchedule,
    ) -> Step {
        loop {
            if let Some(failure) = halt_on(schedule.next_tick().await) {
                return Step::Failed(failure);
            }
            let Some(attempt) = lease.record_attempt() else {
                return Step::Failed(StageFailure::Superseded {
                    hub: hub.clone(),
                    kind: JobKind::Primary,
                });
            };

            let session = self.ctx.session.current();
            let observed = match &job_id {
                Some(id) => self
                    .ctx
                    .client
                    .check_primary_status_by_id(&session, id, hub)
                    .await
                    .map(|r| Observed {
                        job_id: Some(id.clone()),
                        status: r.status,
                        progress: r.progress,
                        previous_report: false,
                    }),
                None => self
                    .ctx
                    .client
                    .check_primary_status(&session, hub)
                    .await
                    .map(|s| Observed {
                        job_id: s.job_id,
                        status: s.status,
                        progress: s.progress,
                        previous_report: s.generation_required,
                    }),
            };

            let observed = match observed {
                Ok(observed) => observed,
                Err(e) => {
                    warn!(hub_id = %hub, attempt, error = %e, "Primary poll failed, retrying next tick");
                    continue;
                }
            };
            let Observed {
                job_id: reported_id,
                status,
                progress,
                previous_report,
            } = observed;
            // Until the hub stops asking for generation, its status still
            // describes the report that preceded the trigger.
            if previous_report {
                debug!(hub_id = %hub, attempt, "Hub still reports the previous report, waiting for the triggered job");
                continue;
            }
            if job_id.is_none() {
                job_id = reported_id;
            }
            debug!(hub_id = %hub, attempt, status = %status, progress = %progress, "Primary poll");

            match (status.known(), &job_id) {
                (Some(JobStatus::Completed), Some(id)) => {
                    self.observe(Some(id.clone()), JobStatus::Completed, progress);
                    return Step::FetchingResult(id.clone());
                }
                (Some(JobStatus::Completed), None) => {
                    warn!(hub_id = %hub, attempt, "Malformed status: completed without a job id, polling again");
                }
                (Some(s @ (JobStatus::Pending | JobStatus::InProgress)), _) => {
                    self.observe(job_id.clone(), s, progress);
                }
                _ => {
                    warn!(hub_id = %hub, status = %status, "Treating status as still pending");
                    let current = self.ctx.state.snapshot().primary.job.status;
                    self.observe(job_id.clone(), current, progress);
                }
            }
        }
    }

    async fn fetch_result(&self, hub: &Hub, job_id: JobId) -> Step {
        let session = self.ctx.session.current();
        match self.ctx.aggregator.fetch_primary(&session, &job_id).await {
            Ok(bundle) => {
                self.ctx
                    .state
                    .dispatch(Transition::PrimaryDone(Arc::new(bundle)));
                let dependent_job = match &hub.primary_job {
                    Some(known) if *known == job_id => hub.dependent_job.clone(),
                    _ => None,
                };
                Step::Done(CompletedPrimary {
                    hub: hub.id.clone(),
                    job_id,
                    dependent_job,
                })
            }
            Err(failure) => Step::Failed(failure.into()),
        }
    }

    fn observe(&self, job_id: Option<JobId>, status: JobStatus, progress: Progress) {
        self.ctx.state.dispatch(Transition::PrimaryObserved {
            job_id,
            status,
            progress,
        });
    }
}

#[cfg(test)]
impl CompletedPrimary {
    pub(crate) fn for_tests(hub: HubId, job_id: JobId) -> Self {
        Self {
            hub,
            job_id,
            dependent_job: None,
        }
    }
}
