//! # Gateway Server
//!
//! HTTP surface of the relay gateway.
//!
//! This crate provides:
//! - Axum routes for the Messages API relay, the model catalog and key self-service
//! - Tenant authentication by API key or session token
//! - The per-address gate and request id middleware
//! - Shared application state and the server bootstrap with graceful shutdown
//! - Seeding of the in-memory credential store

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod routes;
pub mod seed;
pub mod server;
pub mod shutdown;
pub mod state;

// Re-export main types
pub use auth::{
    auth_middleware, hash_api_key, AuthContext, AuthError, AuthMethod, Authenticator,
    API_KEY_HEADER,
};
pub use error::{ApiError, ErrorBody};
pub use health::{ComponentHealth, HealthResponse, HealthStatus};
pub use routes::create_router;
pub use seed::{SeedData, SeedError};
pub use server::{Server, ServerConfig, ServerError};
pub use shutdown::shutdown_signal;
pub use state::{AppState, AppStateBuilder};
