//! HTTP rendering of gateway errors.
//!
//! The domain layer only knows reason strings and status classes; the axum
//! types live here.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use crate::domain::error::GatewayError;

/// Error body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub reason: &'static str,
    pub message: String,
}

impl From<&GatewayError> for ErrorBody {
    fn from(err: &GatewayError) -> Self {
        Self {
            success: false,
            reason: err.reason(),
            message: err.public_message(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(reason = self.reason(), error = %self, "Request failed");
        } else {
            warn!(reason = self.reason(), error = %self, "Request rejected");
        }

        let mut response = (status, Json(ErrorBody::from(&self))).into_response();
        if let GatewayError::TooManyRequests {
            retry_after_secs, ..
        } = self
        {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::{StoreError, ValidationError};

    #[test]
    fn test_validation_renders_400() {
        let response = GatewayError::from(ValidationError::InvalidEmail).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        let response = GatewayError::TooManyRequests {
            client_key: "10.0.0.1".into(),
            retry_after_secs: 30,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
    }

    #[test]
    fn test_error_body_hides_store_details() {
        let err = GatewayError::Store(StoreError::Backend("disk".into()));
        let body = ErrorBody::from(&err);
        assert!(!body.success);
        assert_eq!(body.reason, "store_error");
        assert_eq!(body.message, "Internal server error");
    }
}
