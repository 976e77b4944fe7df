//! Middleware for the payment gateway.
//!
//! Layer order (outermost first): Tracing → SecurityHeaders → CORS → Handler.
//! Rate limiting is not a layer: the pipeline admits each submission and
//! verification itself, before the body is read or parsed, so oversized and
//! malformed bodies still count.

pub mod cors;
pub mod metrics;
pub mod rate_limit;
pub mod security_headers;
pub mod tracing;

pub use cors::create_cors_layer;
pub use metrics::{GatewayMetrics, MetricsSnapshot};
pub use rate_limit::{cleanup_task, client_key, RateLimiter};
pub use security_headers::SecurityHeadersLayer;
pub use tracing::TracingLayer;
