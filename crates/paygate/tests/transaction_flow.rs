//! # End-to-end tests for the payment gateway core
//!
//! Drives the pipeline and the authorization gate over in-memory fakes.
//!
//! ## Test Categories
//!
//! 1. **Submission** - references, terminal status, validation short-circuit
//! 2. **Rate limiting** - window exhaustion and reset
//! 3. **Verification** - role grant only on success, exactly once
//! 4. **Access gate** - fail-closed behaviour under PDP outage

use paygate::test_utils::{ScriptedPdp, TestGateway};
use paygate::{
    AccessDecision, DenyReason, GatewayError, RawSubmission, Reference, SettlementOutcome,
    TransactionStatus, TransactionStore,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// TEST HELPERS
// =============================================================================

fn submission(card_number: &str) -> RawSubmission {
    serde_json::from_value(json!({
        "email": "a@b.com",
        "name": "Ada Lovelace",
        "role": "customer",
        "amount": 10,
        "cardDetails": {"cardNumber": card_number, "expiry": "12/29", "cvv": "123"}
    }))
    .unwrap()
}

fn valid() -> RawSubmission {
    submission("4111111111111111")
}

// =============================================================================
// SUBMISSION
// =============================================================================

#[tokio::test]
async fn submit_then_verify_yields_terminal_record() {
    for outcome in [SettlementOutcome::Success, SettlementOutcome::Failed] {
        let gw = TestGateway::with_pdp(ScriptedPdp::allowing(), outcome);

        let reference = gw.pipeline.submit("10.0.0.1", &valid()).await.unwrap();
        let record = gw.pipeline.verify(&reference).await.unwrap();

        assert_eq!(record.status, outcome.status());
        assert_ne!(record.status, TransactionStatus::Pending);
        assert_eq!(record.metadata.amount, Decimal::from(10));
        assert_eq!(record.metadata.subject, "a@b.com");
    }
}

#[tokio::test]
async fn references_are_never_reissued() {
    let gw = TestGateway::succeeding();
    let mut seen = HashSet::new();
    for i in 0..10 {
        let reference = gw
            .pipeline
            .submit(&format!("client-{i}"), &valid())
            .await
            .unwrap();
        assert!(seen.insert(reference));
    }
    assert_eq!(gw.store.len(), 10);
}

#[tokio::test]
async fn invalid_card_is_rejected_without_side_effects() {
    let gw = TestGateway::succeeding();

    let err = gw
        .pipeline
        .submit("10.0.0.1", &submission("123"))
        .await
        .unwrap_err();

    assert_eq!(err.reason(), "invalid_card_number");
    assert_eq!(err.status_code(), 400);
    assert!(gw.store.is_empty());
    assert_eq!(gw.pdp.create_calls(), 0);
    assert_eq!(gw.pdp.assign_calls(), 0);
}

#[tokio::test]
async fn card_data_never_reaches_the_record() {
    let gw = TestGateway::succeeding();
    let reference = gw.pipeline.submit("k", &valid()).await.unwrap();
    let record = gw.store.get(&reference).await.unwrap().unwrap();

    let serialized = serde_json::to_string(&record).unwrap();
    assert!(!serialized.contains("4111111111111111"));
    assert!(!serialized.contains("12/29"));
}

// =============================================================================
// RATE LIMITING
// =============================================================================

#[tokio::test]
async fn eleventh_submission_is_rate_limited_regardless_of_input() {
    let gw = TestGateway::succeeding();

    for i in 0..10 {
        // Mix valid and invalid input; all count.
        let raw = if i % 2 == 0 { valid() } else { submission("123") };
        let _ = gw.pipeline.submit("10.0.0.9", &raw).await;
    }

    let err = gw.pipeline.submit("10.0.0.9", &valid()).await.unwrap_err();
    assert!(matches!(err, GatewayError::TooManyRequests { .. }));
    assert_eq!(err.status_code(), 429);

    // Five valid submissions made it through before the limit.
    assert_eq!(gw.store.len(), 5);
}

#[tokio::test]
async fn window_reopens_after_interval() {
    let gw = TestGateway::succeeding();
    for _ in 0..10 {
        gw.pipeline.submit("k", &valid()).await.unwrap();
    }
    assert!(gw.pipeline.submit("k", &valid()).await.is_err());

    gw.clock.advance(Duration::from_secs(61));
    assert!(gw.pipeline.submit("k", &valid()).await.is_ok());
}

#[tokio::test]
async fn concurrent_submissions_respect_the_limit() {
    let gw = Arc::new(TestGateway::succeeding());

    let mut handles = Vec::new();
    for _ in 0..25 {
        let gw = Arc::clone(&gw);
        handles.push(tokio::spawn(async move {
            gw.pipeline.submit("burst", &valid()).await.is_ok()
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 10);
}

// =============================================================================
// VERIFICATION
// =============================================================================

#[tokio::test]
async fn verify_success_grants_role_exactly_once() {
    let gw = TestGateway::succeeding();
    let reference = gw.pipeline.submit("k", &valid()).await.unwrap();

    let first = gw.pipeline.verify(&reference).await.unwrap();
    let second = gw.pipeline.verify(&reference).await.unwrap();

    assert!(first.access_granted && second.access_granted);
    assert_eq!(gw.pdp.create_calls(), 1);
    assert_eq!(gw.pdp.assign_calls(), 1);
    assert!(gw.pdp.has_assignment("a@b.com", "customer", "default"));
}

#[tokio::test]
async fn concurrent_verifications_do_not_error() {
    let gw = Arc::new(TestGateway::succeeding());
    let reference = gw.pipeline.submit("k", &valid()).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let gw = Arc::clone(&gw);
        let reference = reference.clone();
        handles.push(tokio::spawn(async move { gw.pipeline.verify(&reference).await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().access_granted);
    }
    assert_eq!(gw.pdp.assignments().len(), 1);
}

#[tokio::test]
async fn verify_failed_transaction_grants_nothing() {
    let gw = TestGateway::failing();
    let reference = gw.pipeline.submit("k", &valid()).await.unwrap();

    let record = gw.pipeline.verify(&reference).await.unwrap();
    assert_eq!(record.status, TransactionStatus::Failed);
    assert_eq!(gw.pdp.create_calls(), 0);
    assert!(!gw.pdp.subject_exists("a@b.com"));
}

#[tokio::test]
async fn verify_unknown_reference_is_not_found() {
    let gw = TestGateway::succeeding();
    let err = gw
        .pipeline
        .verify(&Reference::from("txn_unknown"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn role_failure_surfaces_and_can_be_retried() {
    let gw = TestGateway::with_pdp(
        ScriptedPdp::allowing().failing_assignments(),
        SettlementOutcome::Success,
    );
    let reference = gw.pipeline.submit("k", &valid()).await.unwrap();

    let err = gw.pipeline.verify(&reference).await.unwrap_err();
    assert_eq!(err.reason(), "role_assignment_failed");

    // Record is still a success and not marked granted.
    let record = gw.store.get(&reference).await.unwrap().unwrap();
    assert_eq!(record.status, TransactionStatus::Success);
    assert!(!record.access_granted);
}

// =============================================================================
// ACCESS GATE
// =============================================================================

#[tokio::test]
async fn gate_admits_verified_and_allowed_subject() {
    let gw = TestGateway::succeeding();
    assert_eq!(
        gw.gate.authorize_payment_page("token-a").await,
        AccessDecision::Admit
    );
}

#[tokio::test]
async fn gate_fails_closed_when_pdp_is_down() {
    let gw = TestGateway::with_pdp(
        ScriptedPdp::allowing().always_failing(),
        SettlementOutcome::Success,
    );

    let decision = gw.gate.authorize_payment_page("token-a").await;
    assert_eq!(decision, AccessDecision::Deny(DenyReason::PolicyUnavailable));
    assert_eq!(gw.pdp.allowed_calls(), 3);
    assert_eq!(gw.sleeper.sleeps(), vec![Duration::from_secs(1); 2]);
}

#[tokio::test]
async fn gate_never_consults_pdp_for_unknown_token() {
    let gw = TestGateway::succeeding();
    let decision = gw.gate.authorize_payment_page("forged").await;
    assert_eq!(decision, AccessDecision::Deny(DenyReason::Unauthenticated));
    assert_eq!(gw.pdp.allowed_calls(), 0);
}

#[tokio::test]
async fn gate_does_not_touch_transactions() {
    let gw = TestGateway::succeeding();
    let reference = gw.pipeline.submit("k", &valid()).await.unwrap();
    let before = gw.store.get(&reference).await.unwrap();

    gw.gate.authorize_payment_page("token-a").await;
    assert_eq!(gw.store.get(&reference).await.unwrap(), before);
}
