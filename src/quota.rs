//! Quota gate: fail-closed decision on whether report generation may be triggered.

use crate::client::JobClient;
use crate::types::{QuotaState, Session};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Credits that must remain after any generation. Not user-configurable.
pub const QUOTA_SAFETY_RESERVE: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenyReason {
    /// The quota snapshot could not be read.
    FetchFailed { error: String },
    BelowReserve { remaining: u64, total: u64 },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::FetchFailed { error } => {
                write!(f, "quota could not be read ({})", error)
            }
            DenyReason::BelowReserve { remaining, total } => write!(
                f,
                "insufficient credits: {} of {} remaining (reserve is {})",
                remaining, total, QUOTA_SAFETY_RESERVE
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed(QuotaState),
    Denied(DenyReason),
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed(_))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaGate;

impl QuotaGate {
    pub fn new() -> Self {
        Self
    }

    /// Pure policy over a quota snapshot.
    pub fn evaluate(&self, quota: &QuotaState) -> QuotaDecision {
        if quota.remaining <= QUOTA_SAFETY_RESERVE {
            QuotaDecision::Denied(DenyReason::BelowReserve {
                remaining: quota.remaining,
                total: quota.total,
            })
        } else {
            QuotaDecision::Allowed(*quota)
        }
    }

    /// Read the current quota and decide. Any fetch failure denies.
    pub async fn check(&self, client: &dyn JobClient, session: &Session) -> QuotaDecision {
        let decision = match client.check_quota(session).await {
            Ok(quota) => self.evaluate(&quota),
            Err(e) => QuotaDecision::Denied(DenyReason::FetchFailed {
                error: e.to_string(),
            }),
        };
        match &decision {
            QuotaDecision::Allowed(quota) => debug!(
                remaining = quota.remaining,
                total = quota.total,
                "Quota allows report generation"
            ),
            QuotaDecision::Denied(reason) => warn!(reason = %reason, "Quota denied report generation"),
        }
        decision
    }
}
