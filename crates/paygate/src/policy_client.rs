//! Policy client: bounded-retry, fail-closed wrapper around the PDP.
//!
//! ```text
//! evaluate ──► allowed() ──ok──► Allowed | Denied
//!                 │
//!                 └─err──► sleep(backoff) ──► retry ... ──► Unavailable
//! ```
//!
//! `check_access` collapses `Unavailable` into `false`. Provisioning calls
//! (`ensure_identity`, `assign_role`) are not retried: their failures
//! surface to the caller.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::error::{GatewayError, PdpError};
use crate::domain::retry::RetryPolicy;
use crate::domain::types::{Identity, RoleAssignment, SubjectProfile};
use crate::middleware::metrics::GatewayMetrics;
use crate::ports::outbound::{PolicyDecisionPoint, Sleeper};

/// Result of one policy evaluation, retries included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    Allowed,
    Denied,
    /// Every attempt failed. Treated as a deny.
    Unavailable { attempts: u32, last_error: String },
}

impl PolicyOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyOutcome::Allowed)
    }
}

pub struct PolicyClient {
    pdp: Arc<dyn PolicyDecisionPoint>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    metrics: Arc<GatewayMetrics>,
}

impl PolicyClient {
    pub fn new(
        pdp: Arc<dyn PolicyDecisionPoint>,
        retry: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            pdp,
            retry,
            sleeper,
            metrics,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Ask the PDP whether `subject` may perform `action` on `resource`.
    ///
    /// Any error is retryable; only an explicit `allow: false` ends the loop
    /// early with `Denied`.
    pub async fn evaluate(&self, subject: &str, action: &str, resource: &str) -> PolicyOutcome {
        let mut attempt = 1;
        loop {
            match self.pdp.allowed(subject, action, resource).await {
                Ok(decision) => {
                    debug!(
                        subject,
                        action,
                        resource,
                        allow = decision.allow,
                        attempt,
                        "PDP decision"
                    );
                    return if decision.allow {
                        PolicyOutcome::Allowed
                    } else {
                        PolicyOutcome::Denied
                    };
                }
                Err(err) => {
                    if !self.retry.has_next(attempt) {
                        error!(
                            subject,
                            action,
                            resource,
                            attempts = attempt,
                            error = %err,
                            "PDP unavailable, failing closed"
                        );
                        self.metrics.record_policy_unavailable();
                        return PolicyOutcome::Unavailable {
                            attempts: attempt,
                            last_error: err.to_string(),
                        };
                    }

                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        subject,
                        attempt,
                        max_attempts = self.retry.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "PDP check failed, retrying"
                    );
                    self.metrics.record_policy_retry();
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Fail-closed access check.
    pub async fn check_access(&self, identity: &Identity, action: &str, resource: &str) -> bool {
        self.evaluate(&identity.subject, action, resource)
            .await
            .is_allowed()
    }

    /// Create the PDP subject. An existing subject counts as success.
    pub async fn ensure_identity(&self, profile: &SubjectProfile) -> Result<(), GatewayError> {
        match self.pdp.create_subject(profile).await {
            Ok(()) => {
                info!(subject = %profile.key, "PDP subject created");
                Ok(())
            }
            Err(PdpError::Conflict) => {
                debug!(subject = %profile.key, "PDP subject already exists");
                Ok(())
            }
            Err(err) => {
                error!(subject = %profile.key, error = %err, "PDP subject creation failed");
                Err(GatewayError::IdentityProvisioning(err.to_string()))
            }
        }
    }

    /// Grant a role. Re-granting an existing assignment counts as success.
    pub async fn assign_role(&self, assignment: &RoleAssignment) -> Result<(), GatewayError> {
        match self.pdp.assign_role(assignment).await {
            Ok(()) | Err(PdpError::Conflict) => {
                info!(
                    subject = %assignment.subject,
                    role = %assignment.role,
                    tenant = %assignment.tenant,
                    "Role assigned"
                );
                self.metrics.record_role_granted();
                Ok(())
            }
            Err(err) => {
                error!(subject = %assignment.subject, error = %err, "Role assignment failed");
                Err(GatewayError::RoleAssignment(err.to_string()))
            }
        }
    }
}
