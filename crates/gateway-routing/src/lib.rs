//! # Gateway Routing
//!
//! Upstream account selection for the relay gateway.
//!
//! This crate provides:
//! - The upstream pool: active-account lookup, selection, failure reporting
//! - A pluggable selection strategy with uniform-random as the default
//! - A health-aware alternative that prefers accounts with fewer errors

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod pool;
pub mod strategy;

// Re-export main types
pub use pool::{FailureKind, PoolSummary, UpstreamPool};
pub use strategy::{FewestErrors, SelectionStrategy, UniformRandom};
