//! HTTP adapter for the external policy decision point.
//!
//! Wire contract:
//!
//! | Call | Request | Response |
//! |------|---------|----------|
//! | `POST /allowed` | `{user, action, resource}` | `{allow: bool}` |
//! | `POST /create-user` | `{key, email, first_name, last_name, attributes}` | 2xx, 409 if exists |
//! | `POST /role-assignment` | `{user, role, tenant}` | 2xx |

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::domain::config::{ConfigError, PolicyConfig};
use crate::domain::error::PdpError;
use crate::domain::types::{PolicyDecision, RoleAssignment, SubjectProfile};
use crate::ports::outbound::PolicyDecisionPoint;

#[derive(Serialize)]
struct AllowedRequest<'a> {
    user: &'a str,
    action: &'a str,
    resource: &'a str,
}

/// reqwest-backed PDP client.
#[derive(Debug, Clone)]
pub struct HttpPolicyDecisionPoint {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPolicyDecisionPoint {
    pub fn new(config: &PolicyConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.pdp_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, PdpError> {
        let mut request = self.client.post(self.endpoint(path)).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PdpError::Unavailable(e.to_string()))?;

        let status = response.status();
        debug!(path, status = status.as_u16(), "PDP response");

        if status == StatusCode::CONFLICT {
            return Err(PdpError::Conflict);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PdpError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl PolicyDecisionPoint for HttpPolicyDecisionPoint {
    async fn allowed(
        &self,
        subject: &str,
        action: &str,
        resource: &str,
    ) -> Result<PolicyDecision, PdpError> {
        let body = AllowedRequest {
            user: subject,
            action,
            resource,
        };
        self.post("allowed", &body)
            .await?
            .json::<PolicyDecision>()
            .await
            .map_err(|e| PdpError::Unavailable(format!("malformed decision: {}", e)))
    }

    async fn create_subject(&self, profile: &SubjectProfile) -> Result<(), PdpError> {
        self.post("create-user", profile).await.map(|_| ())
    }

    async fn assign_role(&self, assignment: &RoleAssignment) -> Result<(), PdpError> {
        self.post("role-assignment", assignment).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpPolicyDecisionPoint {
        let config = PolicyConfig {
            pdp_url: format!("{}/", server.uri()),
            api_key: Some("pdp-key".into()),
            request_timeout: Duration::from_secs(2),
            ..PolicyConfig::default()
        };
        HttpPolicyDecisionPoint::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_allowed_sends_triple_with_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/allowed"))
            .and(header("authorization", "Bearer pdp-key"))
            .and(body_json(json!({"user": "a@b.com", "action": "pay", "resource": "payment"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"allow": true})))
            .expect(1)
            .mount(&server)
            .await;

        let decision = client_for(&server)
            .allowed("a@b.com", "pay", "payment")
            .await
            .unwrap();
        assert!(decision.allow);
    }

    #[tokio::test]
    async fn test_create_subject_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create-user"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .create_subject(&SubjectProfile::new("a@b.com", "Ada Lovelace"))
            .await;
        assert_eq!(result, Err(PdpError::Conflict));
    }

    #[tokio::test]
    async fn test_role_assignment_failure_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/role-assignment"))
            .and(body_json(json!({"user": "a@b.com", "role": "customer", "tenant": "default"})))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .assign_role(&RoleAssignment {
                subject: "a@b.com".into(),
                role: "customer".into(),
                tenant: "default".into(),
            })
            .await;
        assert_eq!(
            result,
            Err(PdpError::Rejected {
                status: 500,
                message: "boom".into()
            })
        );
    }

    #[tokio::test]
    async fn test_malformed_decision_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/allowed"))
            .respond_with(ResponseTemplate::new(200).set_body_string("yes"))
            .mount(&server)
            .await;

        let result = client_for(&server).allowed("a@b.com", "pay", "payment").await;
        assert!(matches!(result, Err(PdpError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_unreachable_pdp_is_unavailable() {
        let config = PolicyConfig {
            pdp_url: "http://127.0.0.1:1".into(),
            request_timeout: Duration::from_millis(500),
            ..PolicyConfig::default()
        };
        let pdp = HttpPolicyDecisionPoint::new(&config).unwrap();
        let result = pdp.allowed("a@b.com", "pay", "payment").await;
        assert!(matches!(result, Err(PdpError::Unavailable(_))));
    }
}
