//! Integration tests for the relay gateway
//!
//! The gateway runs on a real socket in front of a wiremock upstream:
//! - API endpoint behavior and error bodies
//! - Quota enforcement across requests
//! - Streaming relay and caller cancellation
//! - Upstream account selection and failover

pub mod fixtures;
pub mod helpers;
pub mod mock_upstream;

// Re-export commonly used items
pub use fixtures::*;
pub use helpers::*;
pub use mock_upstream::*;

#[cfg(test)]
mod api_tests;
#[cfg(test)]
mod e2e_tests;
#[cfg(test)]
mod rate_limit_tests;
#[cfg(test)]
mod routing_tests;
