//! Payment gateway service - HTTP entry point.
//!
//! | Route | Handler |
//! |-------|---------|
//! | `POST /api/payment` | submit a payment, returns a reference |
//! | `GET /api/payment?reference=` | verify a payment, grants the role on success |
//! | `POST /api/access` | payment-page gate |
//! | `POST /api/signup` | enroll a verified subject |
//! | `GET /health`, `GET /metrics` | liveness and counters |

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{ConnectInfo, DefaultBodyLimit, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tracing::{error, info};

use crate::adapters::{
    HttpIdentityVerifier, HttpPolicyDecisionPoint, InMemoryRateWindowStore,
    InMemoryTransactionStore, ProbabilisticSettlement,
};
use crate::domain::config::{ConfigError, GatewayConfig};
use crate::domain::error::{GatewayError, GatewayResult, ValidationError};
use crate::domain::tokenizer::Tokenizer;
use crate::domain::types::{AccessDecision, DenyReason, Enrollment, TransactionStatus};
use crate::gate::AuthorizationGate;
use crate::middleware::{
    cleanup_task, client_key, create_cors_layer, GatewayMetrics, RateLimiter,
    SecurityHeadersLayer, TracingLayer,
};
use crate::pipeline::TransactionPipeline;
use crate::policy_client::PolicyClient;
use crate::ports::outbound::{
    IdentityVerifier, PolicyDecisionPoint, RateWindowStore, SettlementDecider, Sleeper,
    SystemTimeSource, TimeSource, TokioSleeper, TransactionStore,
};

/// Every external collaborator the gateway depends on.
pub struct GatewayComponents {
    pub verifier: Arc<dyn IdentityVerifier>,
    pub pdp: Arc<dyn PolicyDecisionPoint>,
    pub transactions: Arc<dyn TransactionStore>,
    pub rate_windows: Arc<dyn RateWindowStore>,
    pub settlement: Arc<dyn SettlementDecider>,
    pub clock: Arc<dyn TimeSource>,
    pub sleeper: Arc<dyn Sleeper>,
}

impl GatewayComponents {
    /// HTTP collaborators, in-memory stores, wall clock.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            verifier: Arc::new(HttpIdentityVerifier::new(&config.identity)?),
            pdp: Arc::new(HttpPolicyDecisionPoint::new(&config.policy)?),
            transactions: Arc::new(InMemoryTransactionStore::new()),
            rate_windows: Arc::new(InMemoryRateWindowStore::new()),
            settlement: Arc::new(ProbabilisticSettlement::new(
                config.settlement.success_probability,
            )),
            clock: Arc::new(SystemTimeSource),
            sleeper: Arc::new(TokioSleeper),
        })
    }
}

/// Payment gateway service state
pub struct PaymentGatewayService {
    config: GatewayConfig,
    pipeline: Arc<TransactionPipeline>,
    gate: Arc<AuthorizationGate>,
    limiter: Arc<RateLimiter>,
    metrics: Arc<GatewayMetrics>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl PaymentGatewayService {
    /// Create a service with the default collaborators for `config`.
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        config.validate()?;
        let components = GatewayComponents::from_config(&config)?;
        Self::with_components(config, components)
    }

    /// Create a service around caller-supplied collaborators.
    ///
    /// Fails on invalid configuration, including a missing tokenizer secret:
    /// the gateway never starts without one.
    pub fn with_components(
        config: GatewayConfig,
        components: GatewayComponents,
    ) -> GatewayResult<Self> {
        config.validate()?;
        let tokenizer = Tokenizer::new(config.tokenizer.secret.as_deref())?;

        let metrics = Arc::new(GatewayMetrics::new());
        let limiter = Arc::new(RateLimiter::new(
            components.rate_windows,
            components.clock,
            config.rate_limit.to_policy(),
        ));
        let policy = Arc::new(PolicyClient::new(
            components.pdp,
            config.retry.to_policy(),
            components.sleeper,
            Arc::clone(&metrics),
        ));
        let gate = Arc::new(AuthorizationGate::new(
            components.verifier,
            Arc::clone(&policy),
            config.policy.clone(),
            Arc::clone(&metrics),
        ));
        let pipeline = Arc::new(TransactionPipeline::new(
            Arc::clone(&limiter),
            tokenizer,
            components.transactions,
            components.settlement,
            policy,
            config.policy.default_tenant.clone(),
            Arc::clone(&metrics),
        ));

        Ok(Self {
            config,
            pipeline,
            gate,
            limiter,
            metrics,
            shutdown_tx: Mutex::new(None),
        })
    }

    /// Start serving until [`Self::shutdown`] is called or the server fails.
    pub async fn start(&self) -> GatewayResult<()> {
        info!("Starting payment gateway...");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        let limiter = Arc::clone(&self.limiter);
        let cleanup_interval = self.config.rate_limit.cleanup_interval;
        let cleanup = tokio::spawn(async move {
            cleanup_task(limiter, cleanup_interval).await;
        });

        let addr = self.config.http_addr();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr = %addr, "HTTP server listening");

        let result = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
            info!("Received shutdown signal");
        })
        .await;

        cleanup.abort();
        if let Err(e) = &result {
            error!(error = %e, "HTTP server error");
        }
        info!("Payment gateway stopped");
        result.map_err(GatewayError::from)
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn pipeline(&self) -> Arc<TransactionPipeline> {
        Arc::clone(&self.pipeline)
    }

    pub fn gate(&self) -> Arc<AuthorizationGate> {
        Arc::clone(&self.gate)
    }

    /// Build the HTTP router
    pub fn router(&self) -> Router {
        let state = AppState {
            pipeline: Arc::clone(&self.pipeline),
            gate: Arc::clone(&self.gate),
            limiter: Arc::clone(&self.limiter),
            metrics: Arc::clone(&self.metrics),
            max_body_bytes: self.config.http.max_body_bytes,
        };

        let middleware = ServiceBuilder::new()
            .layer(TracingLayer::new())
            .layer(SecurityHeadersLayer::new(&self.config.security_headers))
            .layer(create_cors_layer(&self.config.cors));

        Router::new()
            .route("/api/payment", post(submit_payment).get(verify_payment))
            .route("/api/access", post(check_access))
            .route("/api/signup", post(signup))
            .route("/health", get(health_check))
            .route("/metrics", get(metrics))
            .layer(DefaultBodyLimit::max(self.config.http.max_body_bytes))
            .layer(middleware)
            .with_state(state)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    pipeline: Arc<TransactionPipeline>,
    gate: Arc<AuthorizationGate>,
    limiter: Arc<RateLimiter>,
    metrics: Arc<GatewayMetrics>,
    max_body_bytes: usize,
}

fn request_client_key(headers: &HeaderMap, peer: Option<ConnectInfo<SocketAddr>>) -> String {
    client_key(headers, peer.map(|ConnectInfo(addr)| addr))
}

async fn submit_payment(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, GatewayError> {
    let client = request_client_key(&headers, peer);
    // Charge the client before reading, so oversized bodies count too.
    state.pipeline.admit(&client)?;
    let payload = to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|_| state.pipeline.reject_oversized(state.max_body_bytes))?;
    let reference = state.pipeline.submit_admitted(&payload).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Payment submitted successfully",
        "reference": reference,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    reference: Option<String>,
}

async fn verify_payment(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(query): Query<VerifyQuery>,
) -> Result<Response, GatewayError> {
    let client = request_client_key(&headers, peer);
    let transaction = state
        .pipeline
        .verify_request(&client, query.reference.as_deref())
        .await?;

    if transaction.status == TransactionStatus::Failed {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "reason": "transaction_failed",
                "message": "Transaction failed",
                "transaction": transaction,
            })),
        )
            .into_response());
    }

    Ok(Json(json!({
        "success": true,
        "message": "Payment verified successfully",
        "transaction": transaction,
    }))
    .into_response())
}

#[derive(Debug, Default, Deserialize)]
struct AccessRequest {
    #[serde(default)]
    token: Option<String>,
}

/// Bearer header first, then a `{token}` JSON body.
fn access_token(headers: &HeaderMap, body: &[u8]) -> String {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(token) = bearer {
        return token.to_string();
    }

    serde_json::from_slice::<AccessRequest>(body)
        .ok()
        .and_then(|req| req.token)
        .unwrap_or_default()
}

async fn check_access(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = access_token(&headers, &body);
    match state.gate.authorize_payment_page(&token).await {
        AccessDecision::Admit => Json(json!({ "allowed": true })).into_response(),
        AccessDecision::Deny(reason) => {
            let status = match reason {
                DenyReason::Unauthenticated => StatusCode::UNAUTHORIZED,
                DenyReason::PolicyDenied | DenyReason::PolicyUnavailable => StatusCode::FORBIDDEN,
            };
            (
                status,
                Json(json!({ "allowed": false, "reason": reason.as_str() })),
            )
                .into_response()
        }
    }
}

async fn signup(State(state): State<AppState>, body: Bytes) -> Result<Response, GatewayError> {
    let enrollment: Enrollment = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::from(ValidationError::MalformedPayload(e.to_string())))?;
    let identity = state.gate.enroll(&enrollment).await?;

    Ok(Json(json!({
        "success": true,
        "message": "User registered",
        "subject": identity.subject,
    }))
    .into_response())
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
    }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = state.metrics.to_json();
    body["tracked_clients"] = json!(state.limiter.tracked_clients());
    Json(body)
}
