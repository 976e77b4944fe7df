//! Test utilities for the payment gateway.
//!
//! Deterministic fakes for every outbound port, plus [`TestGateway`], which
//! wires them into a complete service. Enable with the `test-utils` feature.
//!
//! # Example
//!
//! ```rust
//! use paygate::test_utils::FakeClock;
//! use paygate::TimeSource;
//! use std::time::Duration;
//!
//! let clock = FakeClock::new(1_000);
//! clock.advance(Duration::from_secs(1));
//! assert_eq!(clock.now_millis(), 2_000);
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

use crate::adapters::{FixedSettlement, InMemoryRateWindowStore, InMemoryTransactionStore};
use crate::domain::config::GatewayConfig;
use crate::domain::error::{PdpError, VerifierError};
use crate::domain::types::{
    PolicyDecision, RoleAssignment, SettlementOutcome, SubjectProfile, VerifiedClaims,
};
use crate::gate::AuthorizationGate;
use crate::pipeline::TransactionPipeline;
use crate::ports::outbound::{IdentityVerifier, PolicyDecisionPoint, Sleeper, TimeSource};
use crate::service::{GatewayComponents, PaymentGatewayService};

/// Secret used by [`TestGateway`].
pub const TEST_SECRET: &str = "test-gateway-secret";

// =============================================================================
// TIME
// =============================================================================

/// Manually advanced clock.
#[derive(Debug, Default)]
pub struct FakeClock {
    now_ms: AtomicU64,
}

impl FakeClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now_ms.fetch_add(by, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl TimeSource for FakeClock {
    fn now_millis(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Sleeper that returns immediately and remembers what it was asked.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    pub fn total(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
    }
}

// =============================================================================
// POLICY DECISION POINT
// =============================================================================

/// In-memory PDP with scriptable failures.
///
/// Subjects and assignments behave like the real service: creating an
/// existing subject or repeating an assignment answers `Conflict`, and
/// assigning a role to an unknown subject is rejected.
#[derive(Debug, Default)]
pub struct ScriptedPdp {
    allow: AtomicBool,
    always_fail: AtomicBool,
    failures_left: AtomicU32,
    fail_assignments: AtomicBool,
    allowed_calls: AtomicU32,
    create_calls: AtomicU32,
    assign_calls: AtomicU32,
    subjects: Mutex<HashSet<String>>,
    assignments: Mutex<Vec<RoleAssignment>>,
}

impl ScriptedPdp {
    pub fn allowing() -> Self {
        let pdp = Self::default();
        pdp.allow.store(true, Ordering::SeqCst);
        pdp
    }

    pub fn denying() -> Self {
        Self::default()
    }

    /// Fail the next `n` access checks with a transport error.
    pub fn failing_times(self, n: u32) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Fail every access check with a transport error.
    pub fn always_failing(self) -> Self {
        self.always_fail.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_assignments(self) -> Self {
        self.fail_assignments.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_allow(&self, allow: bool) {
        self.allow.store(allow, Ordering::SeqCst);
    }

    pub fn allowed_calls(&self) -> u32 {
        self.allowed_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn assign_calls(&self) -> u32 {
        self.assign_calls.load(Ordering::SeqCst)
    }

    pub fn subject_exists(&self, key: &str) -> bool {
        self.subjects.lock().contains(key)
    }

    pub fn assignments(&self) -> Vec<RoleAssignment> {
        self.assignments.lock().clone()
    }

    pub fn has_assignment(&self, subject: &str, role: &str, tenant: &str) -> bool {
        self.assignments
            .lock()
            .iter()
            .any(|a| a.subject == subject && a.role == role && a.tenant == tenant)
    }
}

#[async_trait]
impl PolicyDecisionPoint for ScriptedPdp {
    async fn allowed(
        &self,
        _subject: &str,
        _action: &str,
        _resource: &str,
    ) -> Result<PolicyDecision, PdpError> {
        self.allowed_calls.fetch_add(1, Ordering::SeqCst);

        if self.always_fail.load(Ordering::SeqCst) {
            return Err(PdpError::Unavailable("scripted outage".into()));
        }
        let consumed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(PdpError::Unavailable("scripted transient failure".into()));
        }

        Ok(PolicyDecision {
            allow: self.allow.load(Ordering::SeqCst),
        })
    }

    async fn create_subject(&self, profile: &SubjectProfile) -> Result<(), PdpError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.subjects.lock().insert(profile.key.clone()) {
            Ok(())
        } else {
            Err(PdpError::Conflict)
        }
    }

    async fn assign_role(&self, assignment: &RoleAssignment) -> Result<(), PdpError> {
        self.assign_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_assignments.load(Ordering::SeqCst) {
            return Err(PdpError::Rejected {
                status: 500,
                message: "scripted assignment failure".into(),
            });
        }
        if !self.subject_exists(&assignment.subject) {
            return Err(PdpError::Rejected {
                status: 404,
                message: format!("unknown subject {}", assignment.subject),
            });
        }

        let mut assignments = self.assignments.lock();
        if assignments.contains(assignment) {
            return Err(PdpError::Conflict);
        }
        assignments.push(assignment.clone());
        Ok(())
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Verifier backed by a fixed token → subject table.
#[derive(Debug, Default)]
pub struct StaticIdentityVerifier {
    tokens: HashMap<String, String>,
    unavailable: bool,
    calls: AtomicU32,
}

impl StaticIdentityVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, subject: &str) -> Self {
        self.tokens.insert(token.to_string(), subject.to_string());
        self
    }

    /// Every verification fails as if the verifier were down.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityVerifier for StaticIdentityVerifier {
    async fn verify_token(&self, raw_token: &str) -> Result<VerifiedClaims, VerifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(VerifierError::Unavailable("scripted outage".into()));
        }

        self.tokens
            .iter()
            .find(|(token, _)| bool::from(token.as_bytes().ct_eq(raw_token.as_bytes())))
            .map(|(_, subject)| VerifiedClaims {
                subject: subject.clone(),
                claims: Default::default(),
            })
            .ok_or_else(|| VerifierError::Invalid("unknown token".into()))
    }
}

// =============================================================================
// FULL GATEWAY
// =============================================================================

/// Complete gateway over fakes, with handles to every fake.
pub struct TestGateway {
    pub service: PaymentGatewayService,
    pub pipeline: Arc<TransactionPipeline>,
    pub gate: Arc<AuthorizationGate>,
    pub pdp: Arc<ScriptedPdp>,
    pub verifier: Arc<StaticIdentityVerifier>,
    pub store: Arc<InMemoryTransactionStore>,
    pub clock: Arc<FakeClock>,
    pub sleeper: Arc<RecordingSleeper>,
}

impl TestGateway {
    /// Every settlement succeeds.
    pub fn succeeding() -> Self {
        Self::with_pdp(ScriptedPdp::allowing(), SettlementOutcome::Success)
    }

    /// Every settlement fails.
    pub fn failing() -> Self {
        Self::with_pdp(ScriptedPdp::allowing(), SettlementOutcome::Failed)
    }

    pub fn with_pdp(pdp: ScriptedPdp, outcome: SettlementOutcome) -> Self {
        Self::build(test_config(), pdp, outcome)
    }

    /// Panics if `config` is rejected.
    pub fn build(config: GatewayConfig, pdp: ScriptedPdp, outcome: SettlementOutcome) -> Self {
        let pdp = Arc::new(pdp);
        let verifier = Arc::new(
            StaticIdentityVerifier::new()
                .with_token("token-a", "a@b.com")
                .with_token("token-c", "c@d.com"),
        );
        let store = Arc::new(InMemoryTransactionStore::new());
        let clock = Arc::new(FakeClock::new(1_700_000_000_000));
        let sleeper = Arc::new(RecordingSleeper::new());

        let components = GatewayComponents {
            verifier: Arc::clone(&verifier) as Arc<dyn IdentityVerifier>,
            pdp: Arc::clone(&pdp) as Arc<dyn PolicyDecisionPoint>,
            transactions: Arc::clone(&store) as _,
            rate_windows: Arc::new(InMemoryRateWindowStore::new()),
            settlement: Arc::new(FixedSettlement(outcome)),
            clock: Arc::clone(&clock) as Arc<dyn TimeSource>,
            sleeper: Arc::clone(&sleeper) as Arc<dyn Sleeper>,
        };

        let service = match PaymentGatewayService::with_components(config, components) {
            Ok(service) => service,
            Err(e) => panic!("test gateway config rejected: {e}"),
        };

        Self {
            pipeline: service.pipeline(),
            gate: service.gate(),
            service,
            pdp,
            verifier,
            store,
            clock,
            sleeper,
        }
    }

    pub fn router(&self) -> axum::Router {
        self.service.router()
    }
}

/// Default configuration plus [`TEST_SECRET`].
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.tokenizer.secret = Some(TEST_SECRET.to_string());
    config
}
