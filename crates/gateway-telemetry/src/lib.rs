//! # Gateway Telemetry
//!
//! Logging and usage accounting for the relay gateway.
//!
//! This crate provides:
//! - Structured logging setup (text or JSON)
//! - Model pricing and cost calculation
//! - Usage metering: usage records plus token quota counters
//! - Per-key usage summaries

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cost;
pub mod logging;
pub mod metering;

// Re-export main types
pub use cost::{ModelPricing, ModelUsage, PricingTable, UsageSummary, DEFAULT_PRICING_MODEL};
pub use logging::{init_logging, LoggingConfig, LoggingError};
pub use metering::{MeteredCall, UsageMeter};
