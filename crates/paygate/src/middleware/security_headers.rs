//! Response hardening headers.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    response::Response,
};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::warn;

use crate::domain::config::SecurityHeadersConfig;

/// Inserts a fixed header set into every response.
#[derive(Clone)]
pub struct SecurityHeadersLayer {
    headers: Arc<Vec<(HeaderName, HeaderValue)>>,
}

impl SecurityHeadersLayer {
    pub fn new(config: &SecurityHeadersConfig) -> Self {
        let mut headers = Vec::new();
        if config.enabled {
            let pairs = [
                ("content-security-policy", config.content_security_policy.as_str()),
                ("x-content-type-options", "nosniff"),
                ("x-frame-options", "DENY"),
                ("x-xss-protection", "1; mode=block"),
                (
                    "strict-transport-security",
                    config.strict_transport_security.as_str(),
                ),
            ];
            for (name, value) in pairs {
                match HeaderValue::from_str(value) {
                    Ok(v) => headers.push((HeaderName::from_static(name), v)),
                    Err(_) => warn!(header = name, "Skipping unrepresentable header value"),
                }
            }
        }
        Self {
            headers: Arc::new(headers),
        }
    }
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeadersService {
            inner,
            headers: Arc::clone(&self.headers),
        }
    }
}

#[derive(Clone)]
pub struct SecurityHeadersService<S> {
    inner: S,
    headers: Arc<Vec<(HeaderName, HeaderValue)>>,
}

impl<S> Service<Request<Body>> for SecurityHeadersService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let headers = Arc::clone(&self.headers);

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            for (name, value) in headers.iter() {
                response.headers_mut().insert(name.clone(), value.clone());
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    async fn respond(config: &SecurityHeadersConfig) -> Response {
        SecurityHeadersLayer::new(config)
            .layer(tower::service_fn(|_req: Request<Body>| async {
                Ok::<_, std::convert::Infallible>(Response::new(Body::empty()))
            }))
            .oneshot(Request::builder().body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_headers_applied() {
        let response = respond(&SecurityHeadersConfig::default()).await;
        let headers = response.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["content-security-policy"], "default-src 'self'");
        assert!(headers.contains_key("strict-transport-security"));
        assert!(headers.contains_key("x-xss-protection"));
    }

    #[tokio::test]
    async fn test_disabled_adds_nothing() {
        let config = SecurityHeadersConfig {
            enabled: false,
            ..SecurityHeadersConfig::default()
        };
        let response = respond(&config).await;
        assert!(!response.headers().contains_key("x-frame-options"));
    }
}
