//! Gateway counters.
//!
//! Plain atomics, exported as a JSON snapshot on `/metrics`.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Payment gateway counters
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    pub submissions_total: AtomicU64,
    pub rate_limited: AtomicU64,
    pub validation_rejected: AtomicU64,
    pub settled_success: AtomicU64,
    pub settled_failed: AtomicU64,
    pub verifications_total: AtomicU64,
    pub roles_granted: AtomicU64,
    pub access_admitted: AtomicU64,
    pub access_denied: AtomicU64,
    pub policy_retries: AtomicU64,
    pub policy_unavailable: AtomicU64,
}

/// Point-in-time copy of [`GatewayMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub submissions_total: u64,
    pub rate_limited: u64,
    pub validation_rejected: u64,
    pub settled_success: u64,
    pub settled_failed: u64,
    pub verifications_total: u64,
    pub roles_granted: u64,
    pub access_admitted: u64,
    pub access_denied: u64,
    pub policy_retries: u64,
    pub policy_unavailable: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submission(&self) {
        bump(&self.submissions_total);
    }

    pub fn record_rate_limited(&self) {
        bump(&self.rate_limited);
    }

    pub fn record_validation_rejected(&self) {
        bump(&self.validation_rejected);
    }

    /// Record a settlement outcome
    pub fn record_settlement(&self, success: bool) {
        if success {
            bump(&self.settled_success);
        } else {
            bump(&self.settled_failed);
        }
    }

    pub fn record_verification(&self) {
        bump(&self.verifications_total);
    }

    pub fn record_role_granted(&self) {
        bump(&self.roles_granted);
    }

    /// Record an access gate decision
    pub fn record_access(&self, admitted: bool) {
        if admitted {
            bump(&self.access_admitted);
        } else {
            bump(&self.access_denied);
        }
    }

    pub fn record_policy_retry(&self) {
        bump(&self.policy_retries);
    }

    pub fn record_policy_unavailable(&self) {
        bump(&self.policy_unavailable);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            submissions_total: load(&self.submissions_total),
            rate_limited: load(&self.rate_limited),
            validation_rejected: load(&self.validation_rejected),
            settled_success: load(&self.settled_success),
            settled_failed: load(&self.settled_failed),
            verifications_total: load(&self.verifications_total),
            roles_granted: load(&self.roles_granted),
            access_admitted: load(&self.access_admitted),
            access_denied: load(&self.access_denied),
            policy_retries: load(&self.policy_retries),
            policy_unavailable: load(&self.policy_unavailable),
        }
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or_default()
    }
}
