//! Outbound ports for the payment gateway.
//!
//! Every collaborator and every piece of shared mutable state sits behind one
//! of these traits, so deployments can swap in a durable store or a different
//! PDP without touching the pipeline.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::error::{PdpError, StoreError, VerifierError};
use crate::domain::rate_window::RateWindow;
use crate::domain::types::{
    PolicyDecision, Reference, RoleAssignment, SettlementOutcome, SubjectProfile,
    TransactionRecord, VerifiedClaims,
};

// =============================================================================
// TIME
// =============================================================================

/// Time source trait for testability
pub trait TimeSource: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// System time implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            // Clock before Unix epoch - return 0 rather than panic
            .unwrap_or(0)
    }
}

/// Suspends the current operation between retries.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Tokio timer implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// =============================================================================
// EXTERNAL COLLABORATORS
// =============================================================================

/// External identity verifier (black-box token check).
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify_token(&self, raw_token: &str) -> Result<VerifiedClaims, VerifierError>;
}

/// External policy decision point.
///
/// Check signature is `(subject, action, resource)` with string resources.
#[async_trait]
pub trait PolicyDecisionPoint: Send + Sync {
    /// `POST /allowed`
    async fn allowed(
        &self,
        subject: &str,
        action: &str,
        resource: &str,
    ) -> Result<PolicyDecision, PdpError>;

    /// `POST /create-user`. Returns [`PdpError::Conflict`] if the subject exists.
    async fn create_subject(&self, profile: &SubjectProfile) -> Result<(), PdpError>;

    /// `POST /role-assignment`
    async fn assign_role(&self, assignment: &RoleAssignment) -> Result<(), PdpError>;
}

/// Simulated settlement decision.
pub trait SettlementDecider: Send + Sync {
    fn decide(&self, record: &TransactionRecord) -> SettlementOutcome;
}

// =============================================================================
// STORES
// =============================================================================

/// Keyed transaction store: the single source of truth for status.
///
/// Implementations must never expose a partially written record and must
/// reject non-monotonic status changes.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn get(&self, reference: &Reference) -> Result<Option<TransactionRecord>, StoreError>;

    /// Create-once. Fails with [`StoreError::Duplicate`] if the reference exists.
    async fn insert(&self, record: TransactionRecord) -> Result<(), StoreError>;

    /// Replace `expected` with `replacement` only if the stored record still
    /// equals `expected`. Returns `Ok(false)` when it changed underneath.
    async fn compare_and_swap(
        &self,
        expected: &TransactionRecord,
        replacement: TransactionRecord,
    ) -> Result<bool, StoreError>;
}

/// Per-client admission windows. Non-blocking.
pub trait RateWindowStore: Send + Sync {
    fn get(&self, key: &str) -> Option<RateWindow>;

    /// Store `replacement` only if the current value equals `expected`
    /// (`None` = key absent).
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<RateWindow>,
        replacement: RateWindow,
    ) -> bool;

    /// Drop windows idle longer than `max_age_ms`; returns how many.
    fn remove_stale(&self, now_ms: u64, max_age_ms: u64) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_is_after_2020() {
        assert!(SystemTimeSource.now_millis() > 1_577_836_800_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_advances_paused_clock() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(1)).await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
