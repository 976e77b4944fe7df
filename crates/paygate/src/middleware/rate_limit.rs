//! Fixed-window admission control keyed by client.
//!
//! Every check is a read-compute-CAS loop against a [`RateWindowStore`], so
//! two concurrent requests from the same key can never both take the last
//! slot of a window.

use axum::http::HeaderMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::adapters::memory::InMemoryRateWindowStore;
use crate::domain::rate_window::{RateLimitPolicy, RateWindow};
use crate::ports::outbound::{RateWindowStore, SystemTimeSource, TimeSource};

/// Key used when no client address can be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Per-client fixed-window rate limiter.
pub struct RateLimiter {
    store: Arc<dyn RateWindowStore>,
    clock: Arc<dyn TimeSource>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn RateWindowStore>,
        clock: Arc<dyn TimeSource>,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// In-memory store, wall clock.
    pub fn in_memory(policy: RateLimitPolicy) -> Self {
        Self::new(
            Arc::new(InMemoryRateWindowStore::new()),
            Arc::new(SystemTimeSource),
            policy,
        )
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Counts this request against `client_key` and reports whether it fits
    /// in the current window. Rejected requests still count.
    pub fn admit(&self, client_key: &str) -> bool {
        let now = self.clock.now_millis();

        loop {
            let current = self.store.get(client_key);
            let next = RateWindow::record(current, now, &self.policy);

            if self.store.compare_and_swap(client_key, current, next) {
                let admitted = next.admits(&self.policy);
                if admitted {
                    debug!(client_key, count = next.count, "Request admitted");
                } else {
                    warn!(
                        client_key,
                        count = next.count,
                        max_requests = self.policy.max_requests,
                        "Rate limit exceeded"
                    );
                }
                return admitted;
            }
        }
    }

    /// Drops windows idle for longer than one interval.
    pub fn cleanup(&self) -> usize {
        let max_age = u64::try_from(self.policy.interval.as_millis()).unwrap_or(u64::MAX);
        let removed = self.store.remove_stale(self.clock.now_millis(), max_age);
        if removed > 0 {
            debug!(removed, remaining = self.store.len(), "Rate window cleanup");
        }
        removed
    }

    /// Number of tracked client keys.
    pub fn tracked_clients(&self) -> usize {
        self.store.len()
    }
}

/// Derive the client key: first `X-Forwarded-For` entry, then `X-Real-IP`,
/// then the peer address.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(first) = header("x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }

    if let Some(real_ip) = header("x-real-ip") {
        return real_ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Background task to clean up stale rate windows
pub async fn cleanup_task(limiter: Arc<RateLimiter>, interval: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        limiter.cleanup();
    }
}
