//! Dependent report state machine.
//!
//! `Idle -> CheckingApplicability -> Polling -> FetchingResult -> Done`, with
//! `Failed` reachable from every non-terminal step. A `not_applicable` marker
//! ends the stage in `Done` with a placeholder bundle and no fetch.

use crate::client::DependentStatus;
use crate::error::StageFailure;
use crate::guard::PollLease;
use crate::report::aggregate::DependentBundle;
use crate::report::primary::CompletedPrimary;
use crate::report::state::{DependentPhase, Transition};
use crate::report::StageContext;
use crate::schedule::{PollSchedule, Tick};
use crate::types::{JobId, JobKind, JobStatus, ReportedStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

enum Step {
    CheckingApplicability,
    Polling,
    FetchingResult(JobId),
    Done(Arc<DependentBundle>),
    Failed(StageFailure),
}

impl Step {
    fn phase(&self) -> DependentPhase {
        match self {
            Step::CheckingApplicability => DependentPhase::CheckingApplicability,
            Step::Polling => DependentPhase::Polling,
            Step::FetchingResult(_) => DependentPhase::FetchingResult,
            Step::Done(_) => DependentPhase::Done,
            Step::Failed(_) => DependentPhase::Failed,
        }
    }
}

pub struct DependentPoller<'a> {
    ctx: &'a StageContext,
    primary: &'a CompletedPrimary,
}

impl<'a> DependentPoller<'a> {
    /// The dependent stage can only be built from a completed primary stage.
    pub fn new(ctx: &'a StageContext, primary: &'a CompletedPrimary) -> Self {
        Self { ctx, primary }
    }

    pub async fn run(&self) -> Result<Arc<DependentBundle>, StageFailure> {
        let hub = self.primary.hub();
        let mut schedule = self.ctx.schedule();
        // The server may name a separate dependent job; until it does, the
        // hub's reference or else the primary job id addresses the bundle.
        let mut dependent_job = self
            .primary
            .dependent_job()
            .unwrap_or(self.primary.job_id())
            .clone();
        let mut step = Step::CheckingApplicability;

        loop {
            let phase = step.phase();
            if !phase.is_terminal() {
                self.ctx.state.dispatch(Transition::DependentPhase(phase));
                info!(hub_id = %hub, kind = %JobKind::Dependent, phase = %phase, "Dependent stage transition");
            }

            step = match step {
                Step::CheckingApplicability => {
                    let session = self.ctx.session.current();
                    match self
                        .ctx
                        .client
                        .check_dependent_status(&session, self.primary.job_id())
                        .await
                    {
                        Ok(status) => self
                            .branch(status, &mut dependent_job)
                            .unwrap_or(Step::Polling),
                        Err(e) => {
                            warn!(hub_id = %hub, error = %e, "Dependent status check failed, polling");
                            Step::Polling
                        }
                    }
                }
                Step::Polling => match self.ctx.guard.try_acquire(hub, JobKind::Dependent) {
                    Some(lease) => {
                        self.poll(&lease, &mut schedule, &mut dependent_job)
                            .await
                    }
                    None => Step::Failed(StageFailure::AlreadyPolling {
                        hub: hub.clone(),
                        kind: JobKind::Dependent,
                    }),
                },
                Step::FetchingResult(job_id) => {
                    let session = self.ctx.session.current();
                    match self.ctx.aggregator.fetch_dependent(&session, &job_id).await {
                        Ok(bundle) => {
                            let bundle = Arc::new(bundle);
                            self.ctx
                                .state
                                .dispatch(Transition::DependentDone(Arc::clone(&bundle)));
                            Step::Done(bundle)
                        }
                        Err(failure) => Step::Failed(failure.into()),
                    }
                }
                Step::Done(bundle) => {
                    info!(
                        hub_id = %hub,
                        job_id = %bundle.job_id,
                        not_applicable = bundle.is_placeholder(),
                        "Dependent report ready"
                    );
                    return Ok(bundle);
                }
                Step::Failed(failure) => {
                    warn!(hub_id = %hub, error = %failure, "Dependent stage failed");
                    self.ctx
                        .state
                        .dispatch(Transition::DependentFailed(failure.clone()));
                    return Err(failure);
                }
            };
        }
    }

    /// Next step for a status report, or `None` to keep polling.
    fn branch(&self, status: DependentStatus, dependent_job: &mut JobId) -> Option<Step> {
        if let Some(id) = &status.job_id {
            *dependent_job = id.clone();
        }

        if status.is_not_applicable() {
            let bundle = Arc::new(DependentBundle::not_applicable(dependent_job.clone()));
            self.ctx
                .state
                .dispatch(Transition::DependentNotApplicable(Arc::clone(&bundle)));
            return Some(Step::Done(bundle));
        }

        match status.status {
            ReportedStatus::Known(JobStatus::Completed) => {
                self.observe(dependent_job, JobStatus::Completed, &status);
                Some(Step::FetchingResult(dependent_job.clone()))
            }
            ReportedStatus::Known(s @ (JobStatus::Pending | JobStatus::InProgress)) => {
                self.observe(dependent_job, s, &status);
                None
            }
            ref other => {
                warn!(job_id = %dependent_job, status = %other, "Treating status as still pending");
                let current = self.ctx.state.snapshot().dependent.job.status;
                self.observe(dependent_job, current, &status);
                None
            }
        }
    }

    async fn poll(
        &self,
        lease: &PollLease,
        schedule: &mut PollSchedule,
        dependent_job: &mut JobId,
    ) -> Step {
        let hub = self.primary.hub();
        loop {
            match schedule.next_tick().await {
                Tick::Due(_) => {}
                Tick::Cancelled => return Step::Failed(StageFailure::Cancelled),
                Tick::Exhausted(attempts) => {
                    return Step::Failed(StageFailure::AttemptsExhausted { attempts })
                }
            }
            let Some(attempt) = lease.record_attempt() else {
                return Step::Failed(StageFailure::Superseded {
                    hub: hub.clone(),
                    kind: JobKind::Dependent,
                });
            };

            let session = self.ctx.session.current();
            match self
                .ctx
                .client
                .check_dependent_status(&session, self.primary.job_id())
                .await
            {
                Ok(status) => {
                    debug!(hub_id = %hub, attempt, status = %status.status, progress = %status.progress, "Dependent poll");
                    if let Some(next) = self.branch(status, dependent_job) {
                        return next;
                    }
                }
                Err(e) => {
                    warn!(hub_id = %hub, attempt, error = %e, "Dependent poll failed, retrying next tick");
                }
            }
        }
    }

    fn observe(&self, job_id: &JobId, status: JobStatus, report: &DependentStatus) {
        self.ctx.state.dispatch(Transition::DependentObserved {
            job_id: Some(job_id.clone()),
            status,
            progress: report.progress,
        });
    }
}
