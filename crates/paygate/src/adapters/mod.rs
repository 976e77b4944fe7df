//! Adapters for the payment gateway.
//!
//! Infrastructure implementations of the outbound ports plus HTTP error
//! rendering.

pub mod error_conversions;
pub mod identity_http;
pub mod memory;
pub mod pdp_http;
pub mod settlement;

pub use error_conversions::ErrorBody;
pub use identity_http::HttpIdentityVerifier;
pub use memory::{InMemoryRateWindowStore, InMemoryTransactionStore};
pub use pdp_http::HttpPolicyDecisionPoint;
pub use settlement::{FixedSettlement, ProbabilisticSettlement};
