//! Report Orchestration
//!
//! Ensures a hub has a completed primary report (triggering generation when
//! needed and quota allows), then drives the dependent report to a terminal
//! outcome, fetching each stage's result bundle along the way. Progress is
//! published as immutable [`ReportState`] snapshots.

pub mod aggregate;
pub mod dependent;
pub mod orchestrator;
pub mod primary;
pub mod state;

pub use aggregate::{DependentBundle, PrimaryBundle, ResultAggregator};
pub use dependent::DependentPoller;
pub use orchestrator::{Orchestrator, ReportHandle};
pub use primary::{CompletedPrimary, PrimaryPoller};
pub use state::{
    DependentPhase, DependentStage, PrimaryPhase, PrimaryStage, ReportState, StateHandle,
    Transition,
};

use crate::client::JobClient;
use crate::config::PollingConfig;
use crate::guard::PollGuard;
use crate::schedule::PollSchedule;
use crate::session::SessionCell;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Collaborators shared by both stage pollers of one orchestrator run.
#[derive(Clone)]
pub struct StageContext {
    pub client: Arc<dyn JobClient>,
    pub guard: PollGuard,
    pub session: SessionCell,
    pub state: StateHandle,
    pub aggregator: ResultAggregator,
    pub polling: PollingConfig,
    pub cancel: CancellationToken,
}

impl StageContext {
    /// Fresh poll schedule bound to this run's cancellation token.
    pub fn schedule(&self) -> PollSchedule {
        PollSchedule::new(
            self.polling.interval(),
            self.polling.max_attempts,
            self.cancel.clone(),
        )
    }
}
