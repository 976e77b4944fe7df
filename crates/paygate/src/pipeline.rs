//! Transaction pipeline.
//!
//! ```text
//! submit:  admit ─► validate ─► tokenize ─► Pending ─► settle ─► insert ─► Reference
//! verify:  lookup ─► Success? ─► ensure_identity ─► assign_role ─► mark granted
//! ```
//!
//! Rate-limit and validation failures return before the store or the PDP
//! is touched. The record is inserted already settled, so no caller ever
//! observes `Pending`.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::domain::error::{GatewayError, GatewayResult, StoreError};
use crate::domain::tokenizer::Tokenizer;
use crate::domain::types::{
    RawSubmission, Reference, RoleAssignment, SettlementOutcome, SubjectProfile,
    TransactionRecord, TransactionStatus,
};
use crate::domain::validation::InputValidator;
use crate::middleware::metrics::GatewayMetrics;
use crate::middleware::rate_limit::RateLimiter;
use crate::policy_client::PolicyClient;
use crate::ports::outbound::{SettlementDecider, TransactionStore};

/// Fresh references to try before giving up on a colliding store.
const MAX_REFERENCE_ATTEMPTS: u32 = 3;

pub struct TransactionPipeline {
    limiter: Arc<RateLimiter>,
    validator: InputValidator,
    tokenizer: Tokenizer,
    store: Arc<dyn TransactionStore>,
    settlement: Arc<dyn SettlementDecider>,
    policy: Arc<PolicyClient>,
    tenant: String,
    metrics: Arc<GatewayMetrics>,
}

impl TransactionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        limiter: Arc<RateLimiter>,
        tokenizer: Tokenizer,
        store: Arc<dyn TransactionStore>,
        settlement: Arc<dyn SettlementDecider>,
        policy: Arc<PolicyClient>,
        tenant: impl Into<String>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            limiter,
            validator: InputValidator::new(),
            tokenizer,
            store,
            settlement,
            policy,
            tenant: tenant.into(),
            metrics,
        }
    }

    /// Submit an already-decoded form.
    pub async fn submit(&self, client_key: &str, raw: &RawSubmission) -> GatewayResult<Reference> {
        self.admit(client_key)?;
        self.process(raw).await
    }

    /// Submit a raw request body. The client is charged before the body is
    /// parsed, so garbage still counts against its window.
    pub async fn submit_payload(
        &self,
        client_key: &str,
        payload: &[u8],
    ) -> GatewayResult<Reference> {
        self.admit(client_key)?;
        self.submit_admitted(payload).await
    }

    /// Second half of [`Self::submit_payload`], for callers that charged the
    /// client through [`Self::admit`] before reading the body.
    pub async fn submit_admitted(&self, payload: &[u8]) -> GatewayResult<Reference> {
        let raw = RawSubmission::from_json(payload).map_err(|e| {
            self.metrics.record_validation_rejected();
            GatewayError::from(e)
        })?;
        self.process(&raw).await
    }

    /// Body that could not be read within the size limit. The client has
    /// already been charged.
    pub fn reject_oversized(&self, limit_bytes: usize) -> GatewayError {
        self.metrics.record_validation_rejected();
        warn!(limit_bytes, "Submission body too large");
        GatewayError::PayloadTooLarge { limit_bytes }
    }

    /// Rate-limited lookup by a reference the caller may have omitted.
    pub async fn verify_request(
        &self,
        client_key: &str,
        reference: Option<&str>,
    ) -> GatewayResult<TransactionRecord> {
        self.admit(client_key)?;
        let reference = reference
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or(GatewayError::MissingReference)?;
        self.verify(&Reference::from(reference)).await
    }

    /// Look up a transaction and, for a successful one, grant access once.
    ///
    /// Failed records come back untouched. A record already marked granted
    /// is returned without calling the PDP again.
    #[instrument(skip(self, reference), fields(reference = %reference))]
    pub async fn verify(&self, reference: &Reference) -> GatewayResult<TransactionRecord> {
        self.metrics.record_verification();

        let record = self
            .store
            .get(reference)
            .await?
            .ok_or_else(|| GatewayError::NotFound(reference.clone()))?;

        match record.status {
            TransactionStatus::Success if !record.access_granted => self.grant(record).await,
            TransactionStatus::Success => {
                debug!("Access already granted");
                Ok(record)
            }
            TransactionStatus::Failed | TransactionStatus::Pending => {
                debug!(status = %record.status, "No access to grant");
                Ok(record)
            }
        }
    }

    /// Charge `client_key` one slot, or fail with `TooManyRequests`.
    pub fn admit(&self, client_key: &str) -> GatewayResult<()> {
        if self.limiter.admit(client_key) {
            Ok(())
        } else {
            self.metrics.record_rate_limited();
            Err(GatewayError::TooManyRequests {
                client_key: client_key.to_string(),
                retry_after_secs: self.limiter.policy().interval.as_secs().max(1),
            })
        }
    }

    async fn process(&self, raw: &RawSubmission) -> GatewayResult<Reference> {
        self.metrics.record_submission();

        let validated = self.validator.validate(raw).map_err(|e| {
            self.metrics.record_validation_rejected();
            warn!(reason = e.reason(), "Submission rejected");
            GatewayError::from(e)
        })?;

        let (metadata, card) = validated.into_parts();
        let token = self.tokenizer.tokenize(&card);
        drop(card);
        debug!(
            token_prefix = token.as_str().get(..8).unwrap_or_default(),
            "Card tokenized"
        );

        for _ in 0..MAX_REFERENCE_ATTEMPTS {
            let mut record = TransactionRecord::pending(Reference::generate(), metadata.clone());
            let outcome = self.settlement.decide(&record);
            record.settle(outcome);
            let reference = record.reference.clone();

            match self.store.insert(record).await {
                Ok(()) => {
                    self.metrics
                        .record_settlement(outcome == SettlementOutcome::Success);
                    info!(
                        reference = %reference,
                        status = %outcome.status(),
                        amount = %metadata.amount,
                        "Transaction recorded"
                    );
                    return Ok(reference);
                }
                Err(StoreError::Duplicate(existing)) => {
                    warn!(reference = %existing, "Reference collision, regenerating");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(GatewayError::Internal(
            "could not allocate a unique transaction reference".into(),
        ))
    }

    async fn grant(&self, record: TransactionRecord) -> GatewayResult<TransactionRecord> {
        let metadata = &record.metadata;
        self.policy
            .ensure_identity(&SubjectProfile::new(&metadata.subject, &metadata.display_name))
            .await?;
        self.policy
            .assign_role(&RoleAssignment {
                subject: metadata.subject.clone(),
                role: metadata.role.clone(),
                tenant: self.tenant.clone(),
            })
            .await?;

        let mut expected = record;
        loop {
            let mut granted = expected.clone();
            granted.access_granted = true;
            if self.store.compare_and_swap(&expected, granted.clone()).await? {
                return Ok(granted);
            }

            // Lost a race with another writer: re-read and retry.
            expected = self
                .store
                .get(&expected.reference)
                .await?
                .ok_or_else(|| GatewayError::NotFound(expected.reference.clone()))?;
            if expected.access_granted {
                return Ok(expected);
            }
        }
    }
}
