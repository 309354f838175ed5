//! # Gateway Providers
//!
//! Upstream relay for the Anthropic Messages API.
//!
//! This crate provides:
//! - Buffered and streamed forwarding of `/v1/messages` calls
//! - Per-account outbound proxies with cached HTTP clients
//! - Best-effort token usage extraction from streamed SSE events

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod sse;

#[cfg(feature = "anthropic")]
pub mod anthropic;

// Re-export main types
pub use error::RelayError;
pub use sse::{interrupted_chunk, UsageTracker};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicRelay, BufferedResponse, RelayConfig, RelayStream, StreamOutcome};
