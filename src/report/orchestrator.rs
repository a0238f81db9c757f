//! End-to-end report flow for one hub.
//!
//! The orchestrator owns the per-lifetime pieces (credential, trigger latch,
//! cancellation token, published state) and sequences the primary stage
//! before the dependent stage. Stage failures end up in the published
//! snapshot; `run` itself never fails.

use crate::client::JobClient;
use crate::config::PollingConfig;
use crate::guard::PollGuard;
use crate::report::aggregate::ResultAggregator;
use crate::report::dependent::DependentPoller;
use crate::report::primary::PrimaryPoller;
use crate::report::state::{ReportState, StateHandle};
use crate::report::StageContext;
use crate::session::{SessionCell, TriggerLatch};
use crate::types::{Hub, HubId, Session};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{info, warn};

pub struct Orchestrator {
    client: Arc<dyn JobClient>,
    guard: PollGuard,
    session: SessionCell,
    polling: PollingConfig,
    trigger: TriggerLatch,
    cancel: CancellationToken,
    state: StateHandle,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn JobClient>, session: Session, polling: PollingConfig) -> Self {
        Self {
            client,
            guard: PollGuard::new(),
            session: SessionCell::new(session),
            polling,
            trigger: TriggerLatch::new(),
            cancel: CancellationToken::new(),
            state: StateHandle::new(ReportState::new(HubId::unassigned())),
        }
    }

    /// Share one poll lock table between orchestrators in the same process.
    pub fn with_guard(mut self, guard: PollGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Tie this orchestrator to an outer token, e.g. one cancelled on Ctrl-C.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<ReportState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ReportState {
        self.state.snapshot()
    }

    /// The credential currently in use; refreshed after a trigger.
    pub fn session(&self) -> Session {
        self.session.current()
    }

    /// Stop scheduling polls. Pending waits resolve immediately and the
    /// stage in progress ends `Failed(Cancelled)`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive `hub` through both stages and return the final snapshot.
    pub async fn run(&self, hub: &Hub) -> ReportState {
        let start = Instant::now();
        self.state.reset(ReportState::new(hub.id.clone()));
        info!(hub_id = %hub.id, "Report orchestration started");

        let ctx = StageContext {
            client: Arc::clone(&self.client),
            guard: self.guard.clone(),
            session: self.session.clone(),
            state: self.state.clone(),
            aggregator: ResultAggregator::new(Arc::clone(&self.client)),
            polling: self.polling.clone(),
            cancel: self.cancel.clone(),
        };

        match PrimaryPoller::new(&ctx, &self.trigger).run(hub).await {
            Ok(completed) => {
                if let Err(failure) = DependentPoller::new(&ctx, &completed).run().await {
                    warn!(hub_id = %hub.id, error = %failure, "Dependent report unavailable");
                }
            }
            Err(failure) => {
                warn!(hub_id = %hub.id, error = %failure, "Primary report unavailable, dependent stage skipped");
            }
        }

        let state = self.state.snapshot();
        info!(
            hub_id = %hub.id,
            primary = %state.primary.phase,
            dependent = %state.dependent.phase,
            duration_ms = start.elapsed().as_millis(),
            "Report orchestration finished"
        );
        state
    }

    /// Run on the tokio runtime; the returned handle stops polling when dropped.
    pub fn spawn(self: Arc<Self>, hub: Hub) -> ReportHandle {
        let cancel = self.cancel.clone();
        let stop_on_drop = cancel.clone().drop_guard();
        let task = tokio::spawn(async move { self.run(&hub).await });
        ReportHandle {
            task,
            cancel,
            stop_on_drop,
        }
    }
}

/// Handle to a spawned orchestration.
pub struct ReportHandle {
    task: JoinHandle<ReportState>,
    cancel: CancellationToken,
    stop_on_drop: DropGuard,
}

impl ReportHandle {
    /// Stop future polls; the task still settles and publishes a final state.
    pub fn abort_polls(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the final snapshot.
    pub async fn join(self) -> Result<ReportState, JoinError> {
        let ReportHandle {
            task, stop_on_drop, ..
        } = self;
        let result = task.await;
        let _ = stop_on_drop.disarm();
        result
    }
}
