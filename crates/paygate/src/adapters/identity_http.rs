//! HTTP adapter for the external identity verifier.
//!
//! `POST {base}/verify {token}` → `200 {subject, claims}`; 400/401/403 mean
//! the token is invalid, anything else means the verifier is unavailable.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::domain::config::{ConfigError, IdentityConfig};
use crate::domain::error::VerifierError;
use crate::domain::types::VerifiedClaims;
use crate::ports::outbound::IdentityVerifier;

#[derive(Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

/// reqwest-backed identity verifier.
#[derive(Debug, Clone)]
pub struct HttpIdentityVerifier {
    client: Client,
    endpoint: String,
}

impl HttpIdentityVerifier {
    pub fn new(config: &IdentityConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/verify", config.verifier_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    async fn verify_token(&self, raw_token: &str) -> Result<VerifiedClaims, VerifierError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&VerifyRequest { token: raw_token })
            .send()
            .await
            .map_err(|e| VerifierError::Unavailable(e.to_string()))?;

        let status = response.status();
        debug!(status = status.as_u16(), "Identity verifier response");

        match status {
            s if s.is_success() => {
                let claims = response
                    .json::<VerifiedClaims>()
                    .await
                    .map_err(|e| VerifierError::Unavailable(format!("malformed claims: {}", e)))?;
                if claims.subject.trim().is_empty() {
                    return Err(VerifierError::Invalid("token carries no subject".into()));
                }
                Ok(claims)
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let message = response.text().await.unwrap_or_default();
                Err(VerifierError::Invalid(message))
            }
            other => Err(VerifierError::Unavailable(format!(
                "verifier returned {}",
                other.as_u16()
            ))),
        }
    }
}
