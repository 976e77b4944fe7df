//! Authorization gate for protected resources.
//!
//! `Start → Verifying-Identity → Checking-Policy → {Admit | Deny}`. An
//! unverified token never reaches the PDP, and nothing here touches
//! transaction state.

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::config::PolicyConfig;
use crate::domain::error::{GatewayError, ValidationError, VerifierError};
use crate::domain::types::{
    AccessDecision, DenyReason, Enrollment, Identity, RoleAssignment, SubjectProfile,
};
use crate::domain::validation::{is_valid_email, sanitize};
use crate::middleware::metrics::GatewayMetrics;
use crate::policy_client::{PolicyClient, PolicyOutcome};
use crate::ports::outbound::IdentityVerifier;

pub struct AuthorizationGate {
    verifier: Arc<dyn IdentityVerifier>,
    policy: Arc<PolicyClient>,
    config: PolicyConfig,
    metrics: Arc<GatewayMetrics>,
}

impl AuthorizationGate {
    pub fn new(
        verifier: Arc<dyn IdentityVerifier>,
        policy: Arc<PolicyClient>,
        config: PolicyConfig,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            verifier,
            policy,
            config,
            metrics,
        }
    }

    /// Verify `raw_token`, then ask the PDP.
    pub async fn authorize(&self, raw_token: &str, action: &str, resource: &str) -> AccessDecision {
        let decision = match self.verify(raw_token).await {
            Err(_) => AccessDecision::Deny(DenyReason::Unauthenticated),
            Ok(identity) => match self.policy.evaluate(&identity.subject, action, resource).await {
                PolicyOutcome::Allowed => AccessDecision::Admit,
                PolicyOutcome::Denied => AccessDecision::Deny(DenyReason::PolicyDenied),
                PolicyOutcome::Unavailable { .. } => {
                    AccessDecision::Deny(DenyReason::PolicyUnavailable)
                }
            },
        };

        self.metrics.record_access(decision.is_admit());
        match decision {
            AccessDecision::Admit => info!(action, resource, "Access admitted"),
            AccessDecision::Deny(reason) => warn!(action, resource, %reason, "Access denied"),
        }
        decision
    }

    /// Gate check for the payment page, using the configured action/resource.
    pub async fn authorize_payment_page(&self, raw_token: &str) -> AccessDecision {
        self.authorize(raw_token, &self.config.gate_action, &self.config.gate_resource)
            .await
    }

    /// Bind a verified token to a PDP subject and grant it a role.
    ///
    /// The claimed email must match the verified subject.
    pub async fn enroll(&self, enrollment: &Enrollment) -> Result<Identity, GatewayError> {
        let token = non_blank(enrollment.id_token.as_deref());
        let email = non_blank(enrollment.email.as_deref()).map(sanitize);
        let (Some(token), Some(email)) = (token, email) else {
            return Err(ValidationError::MissingFields.into());
        };
        if !is_valid_email(&email) {
            return Err(ValidationError::InvalidEmail.into());
        }

        let identity = self
            .verify(token)
            .await
            .map_err(|e| GatewayError::Unauthenticated(e.to_string()))?;
        if !identity.subject.eq_ignore_ascii_case(&email) {
            warn!(claimed = %email, "Enrollment email does not match verified subject");
            return Err(GatewayError::EmailMismatch);
        }

        let name = non_blank(enrollment.name.as_deref())
            .map(sanitize)
            .unwrap_or_else(|| email.clone());
        let role = non_blank(enrollment.role.as_deref())
            .map(sanitize)
            .unwrap_or_else(|| self.config.default_role.clone());

        self.policy
            .ensure_identity(&SubjectProfile::new(&identity.subject, &name))
            .await?;
        self.policy
            .assign_role(&RoleAssignment {
                subject: identity.subject.clone(),
                role,
                tenant: self.config.default_tenant.clone(),
            })
            .await?;

        info!(subject = %identity.subject, "Subject enrolled");
        Ok(identity)
    }

    async fn verify(&self, raw_token: &str) -> Result<Identity, VerifierError> {
        let token = raw_token.trim();
        if token.is_empty() {
            return Err(VerifierError::Invalid("empty token".into()));
        }
        match self.verifier.verify_token(token).await {
            Ok(claims) => Ok(Identity::from_claims(token, claims)),
            Err(err) => {
                warn!(error = %err, "Token verification failed");
                Err(err)
            }
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
