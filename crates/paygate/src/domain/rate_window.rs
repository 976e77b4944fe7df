//! Fixed-window counter arithmetic.
//!
//! Not a sliding log: a client can burst up to twice the limit across a
//! window boundary. That imprecision is accepted for this gate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Admission policy: `max_requests` per `interval` per client key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub interval: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: 10,
            interval: Duration::from_secs(60),
        }
    }
}

/// Counter state for one client key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    pub count: u32,
    /// Milliseconds since the Unix epoch.
    pub window_start_ms: u64,
}

impl RateWindow {
    /// Window that next admission check would produce, given the stored one.
    ///
    /// Resets when `now - window_start > interval`, then counts this request.
    pub fn record(current: Option<RateWindow>, now_ms: u64, policy: &RateLimitPolicy) -> Self {
        let interval_ms = u64::try_from(policy.interval.as_millis()).unwrap_or(u64::MAX);

        let mut window = match current {
            Some(w) if now_ms.saturating_sub(w.window_start_ms) <= interval_ms => w,
            _ => RateWindow {
                count: 0,
                window_start_ms: now_ms,
            },
        };
        window.count = window.count.saturating_add(1);
        window
    }

    pub fn admits(&self, policy: &RateLimitPolicy) -> bool {
        self.count <= policy.max_requests
    }

    /// Whether the window has been idle longer than `max_age_ms`.
    pub fn is_stale(&self, now_ms: u64, max_age_ms: u64) -> bool {
        now_ms.saturating_sub(self.window_start_ms) > max_age_ms
    }
}
