//! Route definitions for the gateway API.

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::{auth, handlers, health, middleware, state::AppState};

/// Create the main API router
///
/// The IP gate runs ahead of authentication on every API route; `/health`
/// bypasses both.
pub fn create_router(state: AppState) -> Router {
    let request_timeout = state.config.server.request_timeout;

    Router::new()
        .route("/health", get(health::health_check))
        .merge(api_routes(state.clone()))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(middleware::request_id_middleware))
        .with_state(state)
}

/// Public and authenticated API routes behind the IP gate
fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(authenticated_routes(state.clone()))
        .route("/v1/models", get(handlers::list_models))
        .route("/claude/v1/models", get(handlers::list_models))
        .route_layer(from_fn_with_state(state, middleware::ip_gate_middleware))
}

fn authenticated_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/messages", post(handlers::messages))
        .route("/claude/v1/messages", post(handlers::messages))
        .route("/api/key/info", get(handlers::key_info))
        .route("/api/usage/stats", get(handlers::usage_stats))
        .route("/api/accounts/status", get(handlers::accounts_status))
        .route_layer(from_fn_with_state(state, auth::auth_middleware))
}
