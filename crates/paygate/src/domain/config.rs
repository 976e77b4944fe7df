//! Gateway configuration with validation.
//!
//! Validation runs once at startup; a failure is fatal and the service must
//! not start serving requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::domain::rate_window::RateLimitPolicy;
use crate::domain::retry::{Backoff, RetryPolicy};

/// Lower bound for retry backoff against the PDP.
pub const MIN_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server configuration
    pub http: HttpConfig,
    /// Per-client admission window
    pub rate_limit: RateLimitConfig,
    /// Policy decision point
    pub policy: PolicyConfig,
    /// Retry policy for PDP access checks
    pub retry: RetryConfig,
    /// Identity verifier
    pub identity: IdentityConfig,
    /// Simulated settlement
    pub settlement: SettlementConfig,
    /// Card tokenization
    pub tokenizer: TokenizerConfig,
    /// Response hardening headers
    pub security_headers: SecurityHeadersConfig,
    /// CORS configuration
    pub cors: CorsConfig,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.tokenizer.secret.as_deref() {
            None => return Err(ConfigError::MissingTokenizerSecret),
            Some(s) if s.trim().is_empty() => return Err(ConfigError::MissingTokenizerSecret),
            Some(_) => {}
        }

        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "max_requests cannot be 0".into(),
            ));
        }
        if self.rate_limit.interval.is_zero() {
            return Err(ConfigError::InvalidRateLimit("interval cannot be 0".into()));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidRetry("max_attempts cannot be 0".into()));
        }
        if self.retry.delay < MIN_RETRY_DELAY {
            return Err(ConfigError::InvalidRetry(format!(
                "delay must be at least {}s",
                MIN_RETRY_DELAY.as_secs()
            )));
        }

        let p = self.settlement.success_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::InvalidSettlement(format!(
                "success_probability {} outside [0, 1]",
                p
            )));
        }

        if self.policy.default_tenant.trim().is_empty() {
            return Err(ConfigError::Invalid("default_tenant cannot be empty".into()));
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 3000)
    pub port: u16,
    /// Max request body size in bytes
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 3000,
            max_body_bytes: 16 * 1024,
        }
    }
}

/// Fixed-window admission control per client key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests admitted per window
    pub max_requests: u32,
    /// Window length
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// How often stale windows are swept
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            interval: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

impl RateLimitConfig {
    pub fn to_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            max_requests: self.max_requests,
            interval: self.interval,
        }
    }
}

/// Policy decision point configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// PDP base URL
    pub pdp_url: String,
    /// Bearer key for the PDP (None = unauthenticated PDP)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Action checked by the payment page gate
    pub gate_action: String,
    /// Resource checked by the payment page gate
    pub gate_resource: String,
    /// Tenant used for role assignments
    pub default_tenant: String,
    /// Role assigned when none was supplied
    pub default_role: String,
    /// Per-call timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            pdp_url: "http://localhost:7766".to_string(),
            api_key: None,
            gate_action: "pay".to_string(),
            gate_resource: "payment".to_string(),
            default_tenant: "default".to_string(),
            default_role: "customer".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl fmt::Debug for PolicyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyConfig")
            .field("pdp_url", &self.pdp_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("gate_action", &self.gate_action)
            .field("gate_resource", &self.gate_resource)
            .field("default_tenant", &self.default_tenant)
            .field("default_role", &self.default_role)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Backoff shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Same delay before every retry
    Fixed,
    /// `delay * attempt`
    Linear,
}

/// Retry configuration for PDP access checks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    /// Base delay (at least 1s)
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffKind::Fixed,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Convert to the domain retry policy
    pub fn to_policy(&self) -> RetryPolicy {
        let backoff = match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed(self.delay),
            BackoffKind::Linear => Backoff::Linear(self.delay),
        };
        RetryPolicy::new(self.max_attempts, backoff)
    }
}

/// Identity verifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Verifier base URL
    pub verifier_url: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            verifier_url: "http://localhost:9099".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Simulated settlement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Probability that a payment settles as `Success`
    pub success_probability: f64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            success_probability: 0.8,
        }
    }
}

/// Tokenizer configuration
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Server-held HMAC key. Required.
    #[serde(skip_serializing)]
    pub secret: Option<String>,
}

impl fmt::Debug for TokenizerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenizerConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Response hardening headers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityHeadersConfig {
    pub enabled: bool,
    pub content_security_policy: String,
    pub strict_transport_security: String,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            content_security_policy: "default-src 'self'".to_string(),
            strict_transport_security: "max-age=31536000; includeSubDomains; preload".to_string(),
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable CORS
    pub enabled: bool,
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    /// Allowed methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Max age for preflight cache
    pub max_age: u64,
    /// Allow credentials
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()],
            allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
            max_age: 86400,
            allow_credentials: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Tokenizer secret absent or empty
    #[error("payment gateway secret not configured")]
    MissingTokenizerSecret,
    /// Invalid rate limiting configuration
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    /// Invalid retry configuration
    #[error("invalid retry policy: {0}")]
    InvalidRetry(String),
    /// Invalid settlement configuration
    #[error("invalid settlement: {0}")]
    InvalidSettlement(String),
    /// Outbound client could not be built
    #[error("invalid client configuration: {0}")]
    Client(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Duration (de)serialization as "60s", "500ms" or "2m".
pub mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" before "s": "500ms" also ends in 's'
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .ok()
                .and_then(|m| m.checked_mul(60))
                .map(Duration::from_secs)
                .ok_or("invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
