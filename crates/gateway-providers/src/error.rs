//! Relay errors.

use gateway_core::GatewayError;
use thiserror::Error;

/// Failure while relaying a call to the upstream
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// HTTP client could not be built (bad proxy URL, TLS setup)
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// Connection, TLS or timeout failure before a response arrived
    #[error("Upstream request failed: {0}")]
    Transport(String),

    /// Upstream answered with a non-success status
    #[error("Upstream returned HTTP {status}")]
    Status {
        /// Upstream status code
        status: u16,
        /// Upstream response body
        body: String,
    },

    /// Upstream answered 2xx with a body that is not JSON
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl RelayError {
    /// Upstream status code, if the upstream answered at all
    #[must_use]
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the upstream rejected the account credential
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        self.upstream_status() == Some(401)
    }

    /// Whether the failure happened below HTTP
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<RelayError> for GatewayError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Client(message) => Self::internal(message),
            RelayError::Status { status, body } => Self::upstream(status, body),
            RelayError::Transport(_) | RelayError::InvalidResponse(_) => {
                Self::upstream(502, err.to_string())
            }
        }
    }
}
