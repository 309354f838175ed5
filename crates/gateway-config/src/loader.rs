//! Configuration loading: file, then environment, then validation.

use secrecy::SecretString;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use validator::Validate;

use crate::config::{Environment, GatewayConfig};
use crate::error::ConfigError;

/// Environment variable naming the config file
pub const CONFIG_PATH_VAR: &str = "RELAY_CONFIG";

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML
    Yaml,
    /// TOML
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Load configuration using the path in `RELAY_CONFIG`, if set.
///
/// Without a file the built-in defaults are used. Environment overrides and
/// validation always apply.
pub async fn load_config() -> Result<GatewayConfig, ConfigError> {
    match std::env::var(CONFIG_PATH_VAR) {
        Ok(path) if !path.is_empty() => load_from_path(path).await,
        _ => {
            debug!("No config file given, using defaults");
            finish(GatewayConfig::default())
        }
    }
}

/// Load configuration from a file, then apply environment overrides
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<GatewayConfig, ConfigError> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    info!(path = %path.display(), "Loading configuration file");
    finish(parse_config(&contents, format)?)
}

fn finish(mut config: GatewayConfig) -> Result<GatewayConfig, ConfigError> {
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

/// Parse file contents without applying overrides or validation
pub fn parse_config(contents: &str, format: ConfigFormat) -> Result<GatewayConfig, ConfigError> {
    match format {
        ConfigFormat::Yaml => serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
            format: "yaml",
            message: e.to_string(),
        }),
        ConfigFormat::Toml => toml::from_str(contents).map_err(|e| ConfigError::Parse {
            format: "toml",
            message: e.to_string(),
        }),
        ConfigFormat::Json => serde_json::from_str(contents).map_err(|e| ConfigError::Parse {
            format: "json",
            message: e.to_string(),
        }),
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
    })
}

/// Apply `RELAY_*` overrides read through `lookup`
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("RELAY_HOST") {
        config.server.host = v;
    }
    if let Some(v) = lookup("RELAY_PORT") {
        config.server.port = parse_var("RELAY_PORT", &v)?;
    }
    if let Some(v) = lookup("RELAY_ENVIRONMENT") {
        config.server.environment = v.parse::<Environment>().map_err(|_| ConfigError::InvalidEnv {
            name: "RELAY_ENVIRONMENT".to_string(),
            value: v.clone(),
        })?;
    }
    if let Some(v) = lookup("RELAY_JWT_SECRET") {
        config.auth.jwt_secret = Some(SecretString::new(v));
    }
    if let Some(v) = lookup("RELAY_UPSTREAM_URL") {
        config.upstream.base_url = v;
    }
    if let Some(v) = lookup("RELAY_UPSTREAM_API_VERSION") {
        config.upstream.api_version = v;
    }
    if let Some(v) = lookup("RELAY_UPSTREAM_BETA") {
        config.upstream.beta_header = Some(v).filter(|s| !s.is_empty());
    }
    if let Some(v) = lookup("RELAY_UPSTREAM_GROUP") {
        config.upstream.group = Some(v).filter(|s| !s.is_empty());
    }
    if let Some(v) = lookup("RELAY_IP_REQUESTS_PER_MINUTE") {
        config.quota.ip_requests_per_minute = parse_var("RELAY_IP_REQUESTS_PER_MINUTE", &v)?;
    }
    if let Some(v) = lookup("RELAY_TRUST_FORWARDED_HEADERS") {
        config.quota.trust_forwarded_headers = parse_var("RELAY_TRUST_FORWARDED_HEADERS", &v)?;
    }
    if let Some(v) = lookup("RELAY_LOG_LEVEL") {
        config.logging.level = v;
    }
    if let Some(v) = lookup("RELAY_LOG_JSON") {
        config.logging.json = parse_var("RELAY_LOG_JSON", &v)?;
    }
    Ok(())
}
