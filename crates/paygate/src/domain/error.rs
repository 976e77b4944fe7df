//! Gateway error taxonomy.
//!
//! Every variant carries a stable `reason()` string and an HTTP-style
//! `status_code()`. Conversion into an actual HTTP response happens only in
//! `adapters::error_conversions`.

use crate::domain::config::ConfigError;
use crate::domain::types::{Reference, TransactionStatus};

/// HTTP status classes used by the gateway.
pub mod status {
    pub const BAD_REQUEST: u16 = 400;
    pub const UNAUTHORIZED: u16 = 401;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const PAYLOAD_TOO_LARGE: u16 = 413;
    pub const TOO_MANY_REQUESTS: u16 = 429;
    pub const INTERNAL_ERROR: u16 = 500;
    pub const BAD_GATEWAY: u16 = 502;
}

/// Input rejections. Checked in declaration order; the first failure wins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("missing required fields")]
    MissingFields,

    #[error("invalid email format")]
    InvalidEmail,

    #[error("invalid amount")]
    InvalidAmount,

    #[error("invalid card number")]
    InvalidCardNumber,

    #[error("invalid expiry date (MM/YY)")]
    InvalidExpiry,

    #[error("invalid CVV")]
    InvalidCvv,
}

impl ValidationError {
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::MalformedPayload(_) => "malformed_payload",
            ValidationError::MissingFields => "missing_fields",
            ValidationError::InvalidEmail => "invalid_email",
            ValidationError::InvalidAmount => "invalid_amount",
            ValidationError::InvalidCardNumber => "invalid_card_number",
            ValidationError::InvalidExpiry => "invalid_expiry",
            ValidationError::InvalidCvv => "invalid_cvv",
        }
    }
}

/// Errors from a [`crate::ports::outbound::PolicyDecisionPoint`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PdpError {
    /// The subject or assignment already exists (HTTP 409).
    #[error("already exists")]
    Conflict,

    /// The PDP answered with a non-success status.
    #[error("PDP rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Transport failure or timeout.
    #[error("PDP unavailable: {0}")]
    Unavailable(String),
}

/// Errors from a [`crate::ports::outbound::IdentityVerifier`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifierError {
    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("identity verifier unavailable: {0}")]
    Unavailable(String),
}

/// Errors from a [`crate::ports::outbound::TransactionStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("reference already exists: {0}")]
    Duplicate(Reference),

    #[error("illegal status transition {from} -> {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Gateway-level error returned by every core operation.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Client input rejected by the validator.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Client exceeded its admission window.
    #[error("too many requests from {client_key}")]
    TooManyRequests {
        client_key: String,
        retry_after_secs: u64,
    },

    /// Startup-time misconfiguration. Fatal.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Request body exceeded the configured limit. Reported after admission,
    /// so it still consumes a rate-limit slot.
    #[error("payload exceeds {limit_bytes} bytes")]
    PayloadTooLarge { limit_bytes: usize },

    #[error("transaction not found: {0}")]
    NotFound(Reference),

    #[error("missing transaction reference")]
    MissingReference,

    /// Creating the PDP subject failed with something other than a conflict.
    #[error("identity provisioning failed: {0}")]
    IdentityProvisioning(String),

    /// Role grant failed. The transaction record itself is untouched.
    #[error("role assignment failed: {0}")]
    RoleAssignment(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("verified subject does not match claimed email")]
    EmailMismatch,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Machine-checkable reason string.
    pub fn reason(&self) -> &'static str {
        match self {
            GatewayError::Validation(e) => e.reason(),
            GatewayError::TooManyRequests { .. } => "too_many_requests",
            GatewayError::Configuration(_) => "configuration_error",
            GatewayError::PayloadTooLarge { .. } => "payload_too_large",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::MissingReference => "missing_reference",
            GatewayError::IdentityProvisioning(_) => "identity_provisioning_failed",
            GatewayError::RoleAssignment(_) => "role_assignment_failed",
            GatewayError::Unauthenticated(_) => "unauthenticated",
            GatewayError::EmailMismatch => "email_mismatch",
            GatewayError::Store(_) => "store_error",
            GatewayError::Internal(_) => "internal_error",
        }
    }

    /// HTTP-style status class.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Validation(_) | GatewayError::MissingReference => status::BAD_REQUEST,
            GatewayError::TooManyRequests { .. } => status::TOO_MANY_REQUESTS,
            GatewayError::Unauthenticated(_) | GatewayError::EmailMismatch => status::UNAUTHORIZED,
            GatewayError::NotFound(_) => status::NOT_FOUND,
            GatewayError::PayloadTooLarge { .. } => status::PAYLOAD_TOO_LARGE,
            GatewayError::IdentityProvisioning(_) | GatewayError::RoleAssignment(_) => {
                status::BAD_GATEWAY
            }
            GatewayError::Configuration(_) | GatewayError::Store(_) | GatewayError::Internal(_) => {
                status::INTERNAL_ERROR
            }
        }
    }

    /// Message safe to show to the caller. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::Configuration(_) | GatewayError::Store(_) | GatewayError::Internal(_) => {
                "Internal server error".to_string()
            }
            GatewayError::TooManyRequests { .. } => "Too many requests".to_string(),
            GatewayError::NotFound(_) => "Transaction not found".to_string(),
            GatewayError::MissingReference => "Missing transaction reference".to_string(),
            GatewayError::Validation(e) => capitalize(&e.to_string()),
            other => capitalize(&other.to_string()),
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
