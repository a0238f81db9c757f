//! Cancellable fixed-interval poll schedule.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The interval elapsed; carries the 1-based attempt number.
    Due(u32),
    Cancelled,
    /// The attempt ceiling was reached before this tick.
    Exhausted(u32),
}

#[derive(Debug)]
pub struct PollSchedule {
    interval: Duration,
    max_attempts: Option<u32>,
    cancel: CancellationToken,
    attempts: u32,
}

impl PollSchedule {
    pub fn new(interval: Duration, max_attempts: Option<u32>, cancel: CancellationToken) -> Self {
        Self {
            interval,
            max_attempts,
            cancel,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait one interval. Cancellation wins over a pending sleep.
    pub async fn next_tick(&mut self) -> Tick {
        if self.cancel.is_cancelled() {
            return Tick::Cancelled;
        }
        if let Some(max) = self.max_attempts {
            if self.attempts >= max {
                return Tick::Exhausted(self.attempts);
            }
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(attempts = self.attempts, "Poll schedule cancelled");
                Tick::Cancelled
            }
            _ = tokio::time::sleep(self.interval) => {
                self.attempts += 1;
                Tick::Due(self.attempts)
            }
        }
    }
}
