//! # Gateway Core
//!
//! Core types, contracts, and error handling for the relay gateway.
//!
//! This crate provides the foundational pieces used throughout the gateway:
//! - Domain types (tenant keys, upstream accounts, quota policies, usage records)
//! - The credential store and TTL cache contracts, with in-memory implementations
//! - The error taxonomy shared by every pipeline stage
//! - A clock abstraction for time-bucketed logic

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod clock;
pub mod error;
pub mod request;
pub mod response;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use cache::{CacheError, CacheResult, MemoryTtlCache, TtlCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{GatewayError, GatewayResult};
pub use request::MessagesRequest;
pub use response::{ModelObject, ModelsResponse, TokenUsage};
pub use store::{CredentialStore, MemoryCredentialStore, StoreError, StoreResult};
pub use types::{
    AccountPatch, AccountStatus, ClientRestrictions, Dimension, KeyStatus, ProxyConfig,
    QuotaPolicy, RateLimitPolicy, TenantKey, TokenLimitPolicy, UpstreamAccount, UsageFilter,
    UsageRecord, User, UserRole, Window,
};
