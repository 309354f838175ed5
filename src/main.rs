//! # Relay Gateway
//!
//! Multi-tenant reverse proxy in front of the Anthropic Messages API.
//!
//! ## Usage
//!
//! ```bash
//! # Start with default configuration
//! relay-gateway
//!
//! # Start with a config file and a credential seed
//! relay-gateway --config /etc/relay/config.yaml --seed /etc/relay/seed.yaml
//!
//! # Start with environment overrides
//! RELAY_PORT=9000 RELAY_UPSTREAM_URL=https://api.anthropic.com relay-gateway
//! ```

use clap::Parser;
use gateway_config::{load_config, load_from_path, GatewayConfig};
use gateway_core::{AccountStatus, CredentialStore, MemoryCredentialStore};
use gateway_server::{AppState, SeedData, Server, ServerConfig};
use gateway_telemetry::{init_logging, LoggingConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "relay-gateway", version, about)]
struct Args {
    /// Configuration file (YAML or TOML)
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Seed file with users, tenant keys and upstream accounts
    #[arg(short, long, env = "RELAY_SEED")]
    seed: Option<PathBuf>,
}

/// Application entry point
#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!(error = %e, "Application failed");
        eprintln!("relay-gateway: {e}");
        std::process::exit(1);
    }
}

/// Main application logic
async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => load_from_path(path).await?,
        None => load_config().await?,
    };

    if let Err(e) = init_logging(&logging_config(&config)) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        environment = ?config.server.environment,
        upstream = %config.upstream.base_url,
        "Starting relay gateway"
    );

    // Create the credential store
    let store = Arc::new(MemoryCredentialStore::new());
    match &args.seed {
        Some(path) => SeedData::load(path).await?.apply(&store)?,
        None => warn!("No seed file given, credential store starts empty"),
    }

    let active = store.get_accounts_by_status(AccountStatus::Active).await?;
    if active.is_empty() {
        warn!("No active upstream accounts; messages requests will get 503");
    }

    // Build application state
    let state = AppState::builder()
        .config(config.clone())
        .store(store)
        .build()?;

    // Run server
    let server = Server::new(ServerConfig::from_config(&config), state);
    server.run().await?;

    Ok(())
}

fn logging_config(config: &GatewayConfig) -> LoggingConfig {
    LoggingConfig::new(config.logging.level.clone())
        .with_json(config.logging.json)
        .with_service_name("relay-gateway")
}
