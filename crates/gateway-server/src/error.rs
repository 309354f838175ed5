//! HTTP error responses.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use gateway_core::GatewayError;
use serde::Serialize;
use serde_json::Value;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Error body: `{"error": kind, "message": text, ...}`
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Error kind
    pub error: &'static str,
    /// Human-readable message
    pub message: String,
    /// Seconds until the violated window resets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// Upstream status code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
    /// Upstream response body, parsed when it is JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// An error ready to be rendered as an HTTP response
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status
    pub status: StatusCode,
    /// Response body
    pub body: ErrorBody,
}

impl ApiError {
    /// Build from a gateway error, optionally withholding internal details
    #[must_use]
    pub fn from_gateway(err: GatewayError, verbose: bool) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let retry_after = err.retry_after();

        let (message, upstream_status, details) = match &err {
            GatewayError::UpstreamError { status, body } => (
                format!("Upstream returned HTTP {status}"),
                Some(*status),
                Some(
                    serde_json::from_str::<Value>(body)
                        .unwrap_or_else(|_| Value::String(body.clone())),
                ),
            ),
            GatewayError::Internal { .. } if !verbose => (INTERNAL_MESSAGE.to_string(), None, None),
            GatewayError::Internal { message } => (message.clone(), None, None),
            GatewayError::BadRequest { message }
            | GatewayError::Unauthorized { message }
            | GatewayError::Forbidden { message }
            | GatewayError::QuotaExceeded { message, .. }
            | GatewayError::StreamInterrupted { message } => (message.clone(), None, None),
            GatewayError::NoUpstreamAvailable => (err.to_string(), None, None),
        };

        Self {
            status,
            body: ErrorBody {
                error: err.error_type(),
                message,
                retry_after,
                upstream_status,
                details,
            },
        }
    }

    /// 400 Bad Request
    pub fn bad_request(message: impl Into<String>) -> Self {
        GatewayError::bad_request(message).into()
    }

    /// 401 Unauthorized
    pub fn unauthorized(message: impl Into<String>) -> Self {
        GatewayError::unauthorized(message).into()
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self::from_gateway(err, false)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = self.body.retry_after;
        let status = self.status;
        let mut response = (status, Json(self.body)).into_response();

        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"api\""),
            );
        }
        response
    }
}
