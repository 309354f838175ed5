//! Shared application state.
//!
//! Built once at startup; handlers receive a cheap clone per request.

use gateway_config::GatewayConfig;
use gateway_core::{
    Clock, CredentialStore, GatewayError, GatewayResult, MemoryCredentialStore, MemoryTtlCache,
    SystemClock, TtlCache,
};
use gateway_providers::{AnthropicRelay, RelayConfig};
use gateway_quota::{IpGate, QuotaLedger};
use gateway_routing::{SelectionStrategy, UniformRandom, UpstreamPool};
use gateway_telemetry::{ModelPricing, PricingTable, UsageMeter};
use std::sync::Arc;
use std::time::Instant;

use crate::auth::Authenticator;
use crate::error::ApiError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration
    pub config: Arc<GatewayConfig>,
    /// Credential store
    pub store: Arc<dyn CredentialStore>,
    /// TTL cache (credentials and counters)
    pub cache: Arc<dyn TtlCache>,
    /// Tenant authentication
    pub authenticator: Arc<Authenticator>,
    /// Per-key quota ledger
    pub ledger: QuotaLedger,
    /// Per-address gate, when enabled
    pub ip_gate: Option<IpGate>,
    /// Upstream account pool
    pub pool: UpstreamPool,
    /// Upstream relay
    pub relay: Arc<AnthropicRelay>,
    /// Usage metering
    pub meter: UsageMeter,
    /// Server start time
    pub started_at: Instant,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("store", &self.store.name())
            .field("cache", &self.cache.name())
            .field("pool", &self.pool)
            .field("ip_gate", &self.ip_gate)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create a new state builder
    #[must_use]
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }

    /// Whether internal error details are returned to callers
    #[must_use]
    pub fn verbose_errors(&self) -> bool {
        !self.config.server.environment.is_production()
    }

    /// Render a pipeline error for this deployment
    #[must_use]
    pub fn api_error(&self, err: GatewayError) -> ApiError {
        ApiError::from_gateway(err, self.verbose_errors())
    }
}

/// Builder for [`AppState`]
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<GatewayConfig>,
    store: Option<Arc<dyn CredentialStore>>,
    cache: Option<Arc<dyn TtlCache>>,
    clock: Option<Arc<dyn Clock>>,
    strategy: Option<Arc<dyn SelectionStrategy>>,
}

impl AppStateBuilder {
    /// Set the configuration
    #[must_use]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the credential store
    #[must_use]
    pub fn store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the TTL cache
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn TtlCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the clock used for quota buckets
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the account selection strategy
    #[must_use]
    pub fn strategy(mut self, strategy: Arc<dyn SelectionStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Build the state
    ///
    /// # Errors
    /// Returns error if the upstream HTTP client cannot be created
    pub fn build(self) -> GatewayResult<AppState> {
        let config = self.config.unwrap_or_default();
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryTtlCache::default()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let strategy = self.strategy.unwrap_or_else(|| Arc::new(UniformRandom));

        let authenticator = Authenticator::new(
            store.clone(),
            cache.clone(),
            config.auth.jwt_secret.as_ref(),
            config.auth.key_cache_ttl,
        );
        let ledger = QuotaLedger::new(cache.clone(), clock.clone());
        let ip_gate = config.quota.ip_gate_enabled.then(|| {
            IpGate::new(
                Arc::new(MemoryTtlCache::new(config.quota.ip_gate_capacity)),
                clock.clone(),
                config.quota.ip_requests_per_minute,
            )
        });
        let pool = UpstreamPool::new(store.clone())
            .with_strategy(strategy)
            .with_group(config.upstream.group.clone());

        let upstream = &config.upstream;
        let relay = AnthropicRelay::new(
            RelayConfig::new(upstream.base_url.clone())
                .with_api_version(upstream.api_version.clone())
                .with_beta_header(upstream.beta_header.clone())
                .with_timeout(upstream.timeout)
                .with_connect_timeout(upstream.connect_timeout)
                .with_stream_buffer(upstream.stream_buffer),
        )?;

        let pricing = PricingTable::from_rates(
            config.pricing.default_model.clone(),
            config
                .pricing
                .models
                .iter()
                .map(|(model, rate)| (model.clone(), ModelPricing::new(rate.input, rate.output))),
        );
        let meter = UsageMeter::new(store.clone(), ledger.clone(), pricing);

        Ok(AppState {
            config: Arc::new(config),
            store,
            cache,
            authenticator: Arc::new(authenticator),
            ledger,
            ip_gate,
            pool,
            relay: Arc::new(relay),
            meter,
            started_at: Instant::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_config::Environment;

    #[test]
    fn test_build_defaults() {
        let state = AppState::builder().build().unwrap();
        assert!(state.ip_gate.is_some());
        assert!(!state.verbose_errors());
        assert_eq!(state.store.name(), "memory");
        assert_eq!(state.meter.pricing().len(), 5);
    }

    #[test]
    fn test_build_from_config() {
        let mut config = GatewayConfig::default();
        config.server.environment = Environment::Development;
        config.quota.ip_gate_enabled = false;
        config.upstream.base_url = "http://127.0.0.1:9".to_string();

        let state = AppState::builder().config(config).build().unwrap();
        assert!(state.ip_gate.is_none());
        assert!(state.verbose_errors());
        assert_eq!(state.relay.config().base_url, "http://127.0.0.1:9");
    }
}
