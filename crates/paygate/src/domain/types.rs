//! Domain types for the payment gateway.
//!
//! Card data only ever lives in [`CardInput`], which never reaches a
//! [`TransactionRecord`] and never prints its contents.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::error::ValidationError;

// =============================================================================
// IDENTITY
// =============================================================================

/// Claims returned by the identity verifier for a valid token.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VerifiedClaims {
    /// Opaque verified principal (an email address in practice).
    pub subject: String,
    /// Remaining claims, passed through untouched.
    #[serde(default)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

/// A verified principal. Request-scoped, never persisted.
#[derive(Clone, PartialEq)]
pub struct Identity {
    pub subject: String,
    pub raw_token: String,
    pub claims: serde_json::Map<String, serde_json::Value>,
}

impl Identity {
    pub fn from_claims(raw_token: impl Into<String>, verified: VerifiedClaims) -> Self {
        Self {
            subject: verified.subject,
            raw_token: raw_token.into(),
            claims: verified.claims,
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("subject", &self.subject)
            .field("raw_token", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// POLICY
// =============================================================================

/// PDP answer for a single subject/action/resource check. Never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allow: bool,
}

/// Role grant sent to the PDP. Re-assigning the same triple is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleAssignment {
    #[serde(rename = "user")]
    pub subject: String,
    pub role: String,
    pub tenant: String,
}

/// Payload of the PDP "create subject" call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub key: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl SubjectProfile {
    /// Build a profile keyed by email, splitting the display name into the
    /// first word and the remainder.
    pub fn new(email: &str, display_name: &str) -> Self {
        let mut words = display_name.split_whitespace();
        let first_name = words
            .next()
            .map(str::to_string)
            .unwrap_or_else(|| display_name.to_string());
        let last_name = words.collect::<Vec<_>>().join(" ");

        Self {
            key: email.to_string(),
            email: email.to_string(),
            first_name,
            last_name,
            attributes: serde_json::Map::new(),
        }
    }
}

/// Outcome of [`crate::AuthorizationGate::authorize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Admit,
    Deny(DenyReason),
}

impl AccessDecision {
    pub fn is_admit(&self) -> bool {
        matches!(self, AccessDecision::Admit)
    }
}

/// Why an access check ended in `Deny`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Token missing or rejected by the verifier. The PDP was not consulted.
    Unauthenticated,
    /// The PDP answered `allow: false`.
    PolicyDenied,
    /// The PDP could not be reached within the retry budget.
    PolicyUnavailable,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Unauthenticated => "unauthenticated",
            DenyReason::PolicyDenied => "access_denied",
            DenyReason::PolicyUnavailable => "policy_unavailable",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Opaque handle for one transaction attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference(String);

impl Reference {
    /// Fresh reference: `txn_` followed by a time-ordered UUID.
    pub fn generate() -> Self {
        Self(format!("txn_{}", uuid::Uuid::now_v7().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Reference {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Reference {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transaction status. `Success` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Only `Pending -> Success` and `Pending -> Failed` are legal.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Success)
                | (TransactionStatus::Pending, TransactionStatus::Failed)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Success => write!(f, "success"),
            TransactionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Simulated settlement result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    Success,
    Failed,
}

impl SettlementOutcome {
    pub fn status(&self) -> TransactionStatus {
        match self {
            SettlementOutcome::Success => TransactionStatus::Success,
            SettlementOutcome::Failed => TransactionStatus::Failed,
        }
    }
}

/// Sanitized, validated metadata kept with a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMetadata {
    /// Verified principal the payment is for (the payer's email).
    pub subject: String,
    pub display_name: String,
    pub role: String,
    /// Strictly positive.
    pub amount: Decimal,
}

/// The single source of truth for one transaction attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub reference: Reference,
    pub status: TransactionStatus,
    pub metadata: TransactionMetadata,
    pub created_at: DateTime<Utc>,
    /// Set once identity materialization and role assignment succeeded.
    #[serde(default)]
    pub access_granted: bool,
}

impl TransactionRecord {
    pub fn pending(reference: Reference, metadata: TransactionMetadata) -> Self {
        Self {
            reference,
            status: TransactionStatus::Pending,
            metadata,
            created_at: Utc::now(),
            access_granted: false,
        }
    }

    /// Move out of `Pending`. Returns `false` (and changes nothing) if the
    /// record already reached a terminal state.
    pub fn settle(&mut self, outcome: SettlementOutcome) -> bool {
        let next = outcome.status();
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }
}

// =============================================================================
// SUBMISSIONS
// =============================================================================

/// Card fields as submitted. Transient: tokenized, then dropped.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardInput {
    pub card_number: String,
    pub expiry: String,
    pub cvv: String,
}

impl fmt::Debug for CardInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardInput")
            .field("card_number", &"<redacted>")
            .field("expiry", &"<redacted>")
            .field("cvv", &"<redacted>")
            .finish()
    }
}

/// Card block of an untrusted submission.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCardDetails {
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default)]
    pub cvv: Option<String>,
}

impl fmt::Debug for RawCardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawCardDetails { <redacted> }")
    }
}

/// Untrusted payment form, exactly as received.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSubmission {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Number or numeric string.
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    #[serde(default)]
    pub card_details: Option<RawCardDetails>,
}

impl RawSubmission {
    pub fn from_json(payload: &[u8]) -> Result<Self, ValidationError> {
        serde_json::from_slice(payload)
            .map_err(|e| ValidationError::MalformedPayload(e.to_string()))
    }
}

/// Output of [`crate::domain::validation::InputValidator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSubmission {
    pub email: String,
    pub name: String,
    pub role: String,
    pub amount: Decimal,
    pub card: CardInput,
}

impl ValidatedSubmission {
    /// Split into the metadata that is kept and the card data that is not.
    pub fn into_parts(self) -> (TransactionMetadata, CardInput) {
        (
            TransactionMetadata {
                subject: self.email,
                display_name: self.name,
                role: self.role,
                amount: self.amount,
            },
            self.card,
        )
    }
}

/// Enrollment request: bind a verified token to a PDP subject and role.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl fmt::Debug for Enrollment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enrollment")
            .field("email", &self.email)
            .field("name", &self.name)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}
