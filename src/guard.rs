//! Poll Guard
//!
//! Keyed lock table that keeps at most one live poll loop per
//! `(hub, job kind)`. Independent hubs and kinds never contend.
//!
//! The guard is advisory and in-process only; two processes (or two guard
//! instances) polling the same hub are not coordinated.

use crate::types::{HubId, JobKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PollKey {
    pub hub: HubId,
    pub kind: JobKind,
}

impl PollKey {
    pub fn new(hub: HubId, kind: JobKind) -> Self {
        Self { hub, kind }
    }
}

/// Live poll loop bookkeeping. Exists only while its lease holds the key.
#[derive(Debug, Clone)]
pub struct PollSession {
    pub token: u64,
    pub attempts: u32,
    pub started_at: Instant,
}

type SessionTable = Arc<Mutex<HashMap<PollKey, PollSession>>>;

#[derive(Debug, Clone, Default)]
pub struct PollGuard {
    sessions: SessionTable,
    next_token: Arc<AtomicU64>,
}

impl PollGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the poll loop for `(hub, kind)`; `None` when one is already live.
    pub fn try_acquire(&self, hub: &HubId, kind: JobKind) -> Option<PollLease> {
        let key = PollKey::new(hub.clone(), kind);
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&key) {
            debug!(hub_id = %hub, kind = %kind, "Poll already active, not acquiring");
            return None;
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed) + 1;
        sessions.insert(
            key.clone(),
            PollSession {
                token,
                attempts: 0,
                started_at: Instant::now(),
            },
        );
        debug!(hub_id = %hub, kind = %kind, token, "Poll session acquired");
        Some(PollLease {
            sessions: Arc::clone(&self.sessions),
            key,
            token,
        })
    }

    /// Drop the live session for `(hub, kind)`. Its lease stops being live.
    pub fn release(&self, hub: &HubId, kind: JobKind) -> bool {
        let released = self
            .sessions
            .lock()
            .remove(&PollKey::new(hub.clone(), kind))
            .is_some();
        if released {
            debug!(hub_id = %hub, kind = %kind, "Poll session released");
        }
        released
    }

    pub fn is_active(&self, hub: &HubId, kind: JobKind) -> bool {
        self.sessions
            .lock()
            .contains_key(&PollKey::new(hub.clone(), kind))
    }

    pub fn attempts(&self, hub: &HubId, kind: JobKind) -> Option<u32> {
        self.sessions
            .lock()
            .get(&PollKey::new(hub.clone(), kind))
            .map(|s| s.attempts)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

/// Ownership of one poll session. Dropping it releases the key if still owned.
#[derive(Debug)]
pub struct PollLease {
    sessions: SessionTable,
    key: PollKey,
    token: u64,
}

impl PollLease {
    pub fn key(&self) -> &PollKey {
        &self.key
    }

    /// Whether this lease still owns its key.
    pub fn is_live(&self) -> bool {
        self.sessions
            .lock()
            .get(&self.key)
            .is_some_and(|s| s.token == self.token)
    }

    /// Count one poll attempt; `None` when the lease has been superseded.
    pub fn record_attempt(&self) -> Option<u32> {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(&self.key) {
            Some(session) if session.token == self.token => {
                session.attempts += 1;
                Some(session.attempts)
            }
            _ => None,
        }
    }
}

impl Drop for PollLease {
    fn drop(&mut self) {
        let mut sessions = self.sessions.lock();
        if sessions.get(&self.key).is_some_and(|s| s.token == self.token) {
            sessions.remove(&self.key);
        }
    }
}
