//! Domain layer: types, errors, configuration and the pure rules
//! (validation, tokenization, fixed-window counting, retry policy).
//!
//! Nothing here performs I/O.

pub mod config;
pub mod error;
pub mod rate_window;
pub mod retry;
pub mod tokenizer;
pub mod types;
pub mod validation;

pub use config::{ConfigError, GatewayConfig};
pub use error::{GatewayError, GatewayResult, PdpError, StoreError, ValidationError, VerifierError};
pub use rate_window::{RateLimitPolicy, RateWindow};
pub use retry::{Backoff, RetryPolicy};
pub use tokenizer::{CardToken, Tokenizer};
pub use types::*;
pub use validation::InputValidator;
