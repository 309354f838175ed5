//! # Gateway Config
//!
//! Configuration management for the relay gateway.
//!
//! Configuration is layered:
//! 1. Built-in defaults
//! 2. A YAML, TOML or JSON file
//! 3. `RELAY_*` environment variables
//!
//! The merged result is validated before it is handed to the server.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod loader;

pub use config::{
    AuthSettings, Environment, GatewayConfig, LoggingSettings, ModelRate, PricingSettings,
    QuotaSettings, ServerSettings, UpstreamSettings,
};
pub use error::ConfigError;
pub use loader::{apply_env_overrides, load_config, load_from_path, parse_config, ConfigFormat};
