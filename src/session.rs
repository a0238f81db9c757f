//! Orchestrator-owned session credential and the one-shot trigger latch.

use crate::types::Session;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Current session credential, replaced whenever the job API hands out a new one.
#[derive(Debug, Clone)]
pub struct SessionCell {
    inner: Arc<RwLock<Session>>,
}

impl SessionCell {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(RwLock::new(session)),
        }
    }

    pub fn current(&self) -> Session {
        self.inner.read().clone()
    }

    pub fn replace(&self, session: Session) {
        *self.inner.write() = session;
        debug!("Session credential refreshed");
    }
}

/// One-shot guard around the non-idempotent generation trigger.
#[derive(Debug, Default)]
pub struct TriggerLatch {
    fired: AtomicBool,
}

impl TriggerLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the single trigger allowed for this latch's lifetime.
    pub fn try_fire(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Re-arm after the trigger call itself failed to reach the server.
    pub fn release_unfired(&self) {
        self.fired.store(false, Ordering::Release);
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
