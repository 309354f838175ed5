//! Typed configuration sections.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listener settings
    #[validate(nested)]
    pub server: ServerSettings,
    /// Authentication settings
    #[validate(nested)]
    pub auth: AuthSettings,
    /// Upstream provider settings
    #[validate(nested)]
    pub upstream: UpstreamSettings,
    /// Gateway-wide admission settings
    #[validate(nested)]
    pub quota: QuotaSettings,
    /// Model pricing
    #[validate(nested)]
    pub pricing: PricingSettings,
    /// Log output
    #[validate(nested)]
    pub logging: LoggingSettings,
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development; internal error details are returned to callers
    Development,
    /// Production; internal error details are withheld
    #[default]
    Production,
}

impl Environment {
    /// Whether this is a production deployment
    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address
    #[validate(length(min = 1))]
    pub host: String,
    /// Bind port
    #[validate(range(min = 1))]
    pub port: u16,
    /// Per-request timeout for buffered calls
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown deadline
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Deployment environment
    pub environment: Environment,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(600),
            shutdown_timeout: Duration::from_secs(30),
            environment: Environment::Production,
        }
    }
}

/// Authentication settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct AuthSettings {
    /// HS256 secret for session tokens; token auth is off when unset
    pub jwt_secret: Option<SecretString>,
    /// How long resolved keys and users stay cached
    #[serde(with = "humantime_serde")]
    pub key_cache_ttl: Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            key_cache_ttl: Duration::from_secs(300),
        }
    }
}

/// Upstream provider settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct UpstreamSettings {
    /// Provider base URL; `/v1/messages` is appended
    #[validate(url)]
    pub base_url: String,
    /// `anthropic-version` header value
    #[validate(length(min = 1))]
    pub api_version: String,
    /// Optional `anthropic-beta` header value
    pub beta_header: Option<String>,
    /// Total timeout for buffered upstream calls
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Chunks buffered between the upstream reader and the caller
    #[validate(range(min = 1, max = 4096))]
    pub stream_buffer: usize,
    /// Only select accounts from this group
    pub group: Option<String>,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            api_version: "2023-06-01".to_string(),
            beta_header: None,
            timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(10),
            stream_buffer: 32,
            group: None,
        }
    }
}

/// Gateway-wide admission settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct QuotaSettings {
    /// Whether the per-IP gate runs
    pub ip_gate_enabled: bool,
    /// Read the caller address from forwarding headers instead of the socket.
    /// Only safe behind a proxy that overwrites them.
    pub trust_forwarded_headers: bool,
    /// Requests per source address per minute
    #[validate(range(min = 1))]
    pub ip_requests_per_minute: u64,
    /// Distinct addresses tracked per minute; new ones are refused beyond it
    #[validate(range(min = 1))]
    pub ip_gate_capacity: usize,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            ip_gate_enabled: true,
            trust_forwarded_headers: false,
            ip_requests_per_minute: 100,
            ip_gate_capacity: 100_000,
        }
    }
}

/// Price of one model in USD per million tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelRate {
    /// Input rate
    pub input: f64,
    /// Output rate
    pub output: f64,
}

/// Model pricing; an empty table means the built-in one
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct PricingSettings {
    /// Tier used for unknown models
    #[validate(length(min = 1))]
    pub default_model: String,
    /// Per-model rates
    #[validate(custom(function = "validate_rates"))]
    pub models: HashMap<String, ModelRate>,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            default_model: "claude-3-sonnet-20240229".to_string(),
            models: HashMap::new(),
        }
    }
}

fn validate_rates(models: &HashMap<String, ModelRate>) -> Result<(), ValidationError> {
    let valid = |rate: f64| rate.is_finite() && rate >= 0.0;
    if models.values().all(|r| valid(r.input) && valid(r.output)) {
        Ok(())
    } else {
        Err(ValidationError::new("negative_or_non_finite_rate"))
    }
}

/// Log output settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` overrides it
    #[validate(length(min = 1))]
    pub level: String,
    /// Emit JSON lines instead of text
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.key_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.quota.ip_requests_per_minute, 100);
        assert_eq!(config.upstream.api_version, "2023-06-01");
        assert!(config.server.environment.is_production());
    }

    #[test]
    fn test_invalid_upstream_url() {
        let mut config = GatewayConfig::default();
        config.upstream.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_ip_ceiling_rejected() {
        let mut config = GatewayConfig::default();
        config.quota.ip_requests_per_minute = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_rate_rejected() {
        let mut config = GatewayConfig::default();
        config.pricing.models.insert(
            "cheap".to_string(),
            ModelRate {
                input: -1.0,
                output: 2.0,
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_table_validates() {
        let mut config = GatewayConfig::default();
        let rate = ModelRate {
            input: 3.0,
            output: 15.0,
        };
        config.pricing.models.insert("claude-sonnet-4".to_string(), rate);
        assert!(config.validate().is_ok());
        assert_eq!(
            serde_json::to_value(rate).unwrap(),
            serde_json::json!({"input": 3.0, "output": 15.0})
        );
    }

    #[test]
    fn test_forwarded_headers_untrusted_by_default() {
        assert!(!GatewayConfig::default().quota.trust_forwarded_headers);
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!("dev".parse::<Environment>(), Ok(Environment::Development));
        assert_eq!("Production".parse::<Environment>(), Ok(Environment::Production));
        assert!("staging".parse::<Environment>().is_err());
    }
}
