//! Liveness endpoint for the gateway.
//!
//! Reports process uptime plus a shallow probe of the credential store and
//! the TTL cache. Upstream accounts are not contacted.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::warn;

use crate::state::AppState;

/// Setting name read by the store probe
const STORE_PROBE: &str = "health_probe";

/// Cache key read by the cache probe
const CACHE_PROBE: &str = "health:probe";

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Fully healthy
    Healthy,
    /// Unhealthy
    Unhealthy,
}

impl HealthStatus {
    /// Check if status represents a healthy state
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Get HTTP status code for this health status
    #[must_use]
    pub fn http_status_code(&self) -> StatusCode {
        match self {
            Self::Healthy => StatusCode::OK,
            Self::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Component health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Backend name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Time taken for the check
    pub check_duration_ms: u64,
    /// Error message if unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn from_probe<E: std::fmt::Display>(
        name: &str,
        started: Instant,
        result: Result<(), E>,
    ) -> Self {
        let check_duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(()) => Self {
                name: name.to_string(),
                status: HealthStatus::Healthy,
                check_duration_ms,
                error: None,
            },
            Err(e) => Self {
                name: name.to_string(),
                status: HealthStatus::Unhealthy,
                check_duration_ms,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Health response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status
    pub status: HealthStatus,
    /// Gateway version
    pub version: String,
    /// Seconds since the state was built
    pub uptime_seconds: u64,
    /// Credential store probe
    pub store: ComponentHealth,
    /// TTL cache probe
    pub cache: ComponentHealth,
}

/// Liveness check
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let started = Instant::now();
    let store = ComponentHealth::from_probe(
        state.store.name(),
        started,
        state.store.query_setting(STORE_PROBE).await.map(|_| ()),
    );

    let started = Instant::now();
    let cache = ComponentHealth::from_probe(
        state.cache.name(),
        started,
        state.cache.get(CACHE_PROBE).await.map(|_| ()),
    );

    let status = if store.status.is_healthy() && cache.status.is_healthy() {
        HealthStatus::Healthy
    } else {
        warn!(store = ?store.error, cache = ?cache.error, "Health check failed");
        HealthStatus::Unhealthy
    };

    (
        status.http_status_code(),
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.started_at.elapsed().as_secs(),
            store,
            cache,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_codes() {
        assert_eq!(HealthStatus::Healthy.http_status_code(), StatusCode::OK);
        assert_eq!(
            HealthStatus::Unhealthy.http_status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert!(!HealthStatus::Unhealthy.is_healthy());
    }

    #[tokio::test]
    async fn test_health_check_memory_backends() {
        let state = AppState::builder().build().unwrap();
        let (status, Json(body)) = health_check(State(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, HealthStatus::Healthy);
        assert_eq!(body.store.name, "memory");
        assert!(body.cache.error.is_none());
    }

    #[test]
    fn test_component_from_failed_probe() {
        let health = ComponentHealth::from_probe("memory", Instant::now(), Err("down"));
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.error.as_deref(), Some("down"));
    }
}
