//! Paygate - identity- and policy-gated payment submission.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                             PAYGATE                                   │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │   POST/GET /api/payment      POST /api/access    POST /api/signup     │
//! │            │                         │                  │             │
//! │  ┌─────────┴─────────┐     ┌─────────┴──────────────────┴─────────┐  │
//! │  │ TransactionPipeline│     │          AuthorizationGate           │  │
//! │  │ RateLimiter        │     │  IdentityVerifier ─► PolicyClient    │  │
//! │  │ InputValidator     │     └──────────────────────┬───────────────┘  │
//! │  │ Tokenizer          │                            │                  │
//! │  │ SettlementDecider  │──── verify(Success) ──────►│                  │
//! │  └─────────┬──────────┘                            │                  │
//! │            │                                       │                  │
//! │  ┌─────────┴──────────┐                 ┌──────────┴──────────┐       │
//! │  │  TransactionStore  │                 │ PolicyDecisionPoint │       │
//! │  │  (get / insert /   │                 │ allowed / create /  │       │
//! │  │   compare-and-swap)│                 │ role-assignment     │       │
//! │  └────────────────────┘                 └─────────────────────┘       │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - Access checks fail closed: a PDP outage after the retry budget is a deny.
//! - An unverified token never reaches the PDP.
//! - Transaction status is monotonic, and roles are only granted for
//!   `Success` records, once.
//! - Rate-limit and validation rejections have no side effects.
//! - The gateway refuses to start without a tokenizer secret.
//!
//! # Usage
//!
//! ```ignore
//! use paygate::{GatewayConfig, PaymentGatewayService};
//!
//! let mut config = GatewayConfig::default();
//! config.tokenizer.secret = Some(secret);
//! let service = PaymentGatewayService::new(config)?;
//! service.start().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod gate;
pub mod middleware;
pub mod pipeline;
pub mod policy_client;
pub mod ports;
pub mod service;

/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use domain::config::{ConfigError, GatewayConfig};
pub use domain::error::{GatewayError, GatewayResult, ValidationError};
pub use domain::types::*;
pub use domain::{Backoff, CardToken, InputValidator, RateLimitPolicy, RetryPolicy, Tokenizer};
pub use gate::AuthorizationGate;
pub use middleware::{GatewayMetrics, RateLimiter};
pub use pipeline::TransactionPipeline;
pub use policy_client::{PolicyClient, PolicyOutcome};
pub use ports::{
    IdentityVerifier, PolicyDecisionPoint, RateWindowStore, SettlementDecider, Sleeper,
    TimeSource, TransactionStore,
};
pub use service::{GatewayComponents, PaymentGatewayService};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
