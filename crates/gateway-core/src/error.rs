//! Error taxonomy for the gateway pipeline.
//!
//! Every stage of the request pipeline fails with a [`GatewayError`]. All
//! variants are terminal for the request they occur in; the gateway never
//! retries on its own.

use thiserror::Error;

/// Result alias used across the gateway crates.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error type
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Malformed request payload
    #[error("Bad request: {message}")]
    BadRequest {
        /// Error message
        message: String,
    },

    /// Missing, unknown, expired or inactive credential
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Error message
        message: String,
    },

    /// Credential is valid but the caller is not allowed
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Error message
        message: String,
    },

    /// A request or token limit was hit
    #[error("Quota exceeded: {message}")]
    QuotaExceeded {
        /// Error message
        message: String,
        /// Seconds until the violated bucket rolls over
        retry_after: u64,
    },

    /// The active upstream account pool is empty
    #[error("No upstream account available")]
    NoUpstreamAvailable,

    /// Upstream answered with a non-2xx status or could not be reached
    #[error("Upstream returned HTTP {status}")]
    UpstreamError {
        /// Upstream status code (502 when the upstream was unreachable)
        status: u16,
        /// Raw upstream body
        body: String,
    },

    /// Upstream failed after a streamed response had started
    #[error("Upstream stream interrupted: {message}")]
    StreamInterrupted {
        /// Error message
        message: String,
    },

    /// Unexpected internal failure
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl GatewayError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a forbidden error
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Create a quota exceeded error
    pub fn quota_exceeded(message: impl Into<String>, retry_after: u64) -> Self {
        Self::QuotaExceeded {
            message: message.into(),
            retry_after,
        }
    }

    /// Create an upstream error
    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        Self::UpstreamError {
            status,
            body: body.into(),
        }
    }

    /// Create a stream interrupted error
    pub fn stream_interrupted(message: impl Into<String>) -> Self {
        Self::StreamInterrupted {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status code for this error.
    ///
    /// Upstream errors pass the upstream status through when it is a valid
    /// error status; anything else maps to 502.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::QuotaExceeded { .. } => 429,
            Self::NoUpstreamAvailable => 503,
            Self::UpstreamError { status, .. } if (400..=599).contains(status) => *status,
            Self::UpstreamError { .. } | Self::StreamInterrupted { .. } => 502,
            Self::Internal { .. } => 500,
        }
    }

    /// Machine-readable error kind, used as the `error` field of JSON bodies
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::NoUpstreamAvailable => "no_upstream_available",
            Self::UpstreamError { .. } => "upstream_error",
            Self::StreamInterrupted { .. } => "stream_interrupted",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Seconds the caller should wait before retrying, if applicable
    #[must_use]
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::QuotaExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Whether the caller is at fault
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::BadRequest { .. }
                | Self::Unauthorized { .. }
                | Self::Forbidden { .. }
                | Self::QuotaExceeded { .. }
        )
    }
}
