//! Quota ledger.
//!
//! Each (tenant key, dimension, window) triple owns one counter per bucket,
//! where the bucket index is `floor(now / window_seconds)`. Windows are
//! checked finest first so the reported `retry_after` is the shortest wait
//! that could help.
//!
//! # Consistency
//!
//! Updates are read-then-write against the cache. Concurrent requests for the
//! same key can both read the same value, so under load a limit may be
//! overshot by up to `concurrency - 1` requests within one bucket. Backends
//! with an atomic increment can close that gap without changing callers.

use gateway_core::cache::{get_counter, set_counter};
use gateway_core::{
    CacheResult, Clock, Dimension, GatewayError, GatewayResult, TenantKey, TtlCache, Window,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Token headroom a request needs before it is relayed.
///
/// Token limits are enforced against usage already metered, not against an
/// estimate of the request in flight, so one large request can overshoot the
/// budget before it is counted.
pub const TOKEN_HEADROOM: u64 = 1;

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Within every configured limit
    Admitted,
    /// A window's limit would be exceeded
    Rejected {
        /// The first violated window
        window: Window,
        /// Its configured limit
        limit: u64,
        /// Seconds until that window's bucket rolls over
        retry_after: u64,
    },
}

impl Admission {
    /// Whether the request may proceed
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }

    /// Convert into a gateway result for the given dimension
    pub fn into_result(self, dimension: Dimension) -> GatewayResult<()> {
        match self {
            Self::Admitted => Ok(()),
            Self::Rejected {
                window,
                limit,
                retry_after,
            } => Err(GatewayError::quota_exceeded(
                format!("Too many {dimension} per {window}. Limit: {limit}"),
                retry_after,
            )),
        }
    }
}

/// Bucket index of `now` for a window
#[must_use]
pub fn bucket_index(now: u64, window: Window) -> u64 {
    now / window.seconds()
}

/// Seconds left in the current bucket, always in `1..=window_seconds`
#[must_use]
pub fn retry_after(now: u64, window: Window) -> u64 {
    window.seconds() - (now % window.seconds())
}

/// Counter key: `{tenantKeyId}:{dimension}:{window}:{bucketIndex}`
#[must_use]
pub fn counter_key(tenant_key_id: &str, dimension: Dimension, window: Window, bucket: u64) -> String {
    format!("{tenant_key_id}:{dimension}:{window}:{bucket}")
}

/// Per-key quota ledger backed by the TTL cache
#[derive(Clone)]
pub struct QuotaLedger {
    cache: Arc<dyn TtlCache>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for QuotaLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaLedger")
            .field("cache", &self.cache.name())
            .field("clock", &self.clock)
            .finish()
    }
}

impl QuotaLedger {
    /// Create a ledger
    pub fn new(cache: Arc<dyn TtlCache>, clock: Arc<dyn Clock>) -> Self {
        Self { cache, clock }
    }

    /// Current counter value for a window
    pub async fn usage(
        &self,
        tenant_key_id: &str,
        dimension: Dimension,
        window: Window,
    ) -> CacheResult<u64> {
        let now = self.clock.now_epoch_seconds();
        let key = counter_key(tenant_key_id, dimension, window, bucket_index(now, window));
        get_counter(self.cache.as_ref(), &key).await
    }

    /// Read-only check of `amount` against every configured window
    pub async fn check(
        &self,
        tenant_key: &TenantKey,
        dimension: Dimension,
        amount: u64,
    ) -> CacheResult<Admission> {
        let Some(policy) = tenant_key.limits.as_ref() else {
            return Ok(Admission::Admitted);
        };
        let now = self.clock.now_epoch_seconds();

        for window in Window::ALL {
            let Some(limit) = policy.limit(dimension, window) else {
                continue;
            };
            let key = counter_key(&tenant_key.id, dimension, window, bucket_index(now, window));
            let used = get_counter(self.cache.as_ref(), &key).await?;

            if used.saturating_add(amount) > limit {
                debug!(
                    tenant_key = %tenant_key.id,
                    dimension = %dimension,
                    window = %window,
                    used,
                    limit,
                    "Quota window exhausted"
                );
                return Ok(Admission::Rejected {
                    window,
                    limit,
                    retry_after: retry_after(now, window),
                });
            }
        }

        Ok(Admission::Admitted)
    }

    /// Check and, when admitted, add `amount` to every configured window
    pub async fn admit(
        &self,
        tenant_key: &TenantKey,
        dimension: Dimension,
        amount: u64,
    ) -> CacheResult<Admission> {
        let admission = self.check(tenant_key, dimension, amount).await?;
        if admission.is_admitted() {
            self.commit(tenant_key, dimension, amount).await?;
        }
        Ok(admission)
    }

    async fn commit(
        &self,
        tenant_key: &TenantKey,
        dimension: Dimension,
        amount: u64,
    ) -> CacheResult<()> {
        let Some(policy) = tenant_key.limits.as_ref() else {
            return Ok(());
        };
        let now = self.clock.now_epoch_seconds();
        for window in Window::ALL {
            if policy.limit(dimension, window).is_some() {
                self.add(&tenant_key.id, dimension, window, now, amount).await?;
            }
        }
        Ok(())
    }

    async fn add(
        &self,
        tenant_key_id: &str,
        dimension: Dimension,
        window: Window,
        now: u64,
        amount: u64,
    ) -> CacheResult<u64> {
        let key = counter_key(tenant_key_id, dimension, window, bucket_index(now, window));
        let cache = self.cache.as_ref();
        let value = get_counter(cache, &key).await?.saturating_add(amount);
        set_counter(cache, &key, value, Duration::from_secs(window.seconds())).await?;
        Ok(value)
    }

    /// Admission for a request about to be relayed.
    ///
    /// Checks the request windows, then the token windows against usage
    /// already metered, and only then counts the request.
    pub async fn enforce(&self, tenant_key: &TenantKey) -> GatewayResult<()> {
        if tenant_key.limits.is_none() {
            return Ok(());
        }

        let requests = self.check(tenant_key, Dimension::Requests, 1).await?;
        if let Admission::Rejected { window, .. } = requests {
            warn!(tenant_key = %tenant_key.id, window = %window, "Request limit exceeded");
            return requests.into_result(Dimension::Requests);
        }

        let tokens = self
            .check(tenant_key, Dimension::Tokens, TOKEN_HEADROOM)
            .await?;
        if let Admission::Rejected { window, .. } = tokens {
            warn!(tenant_key = %tenant_key.id, window = %window, "Token limit exceeded");
            return tokens.into_result(Dimension::Tokens);
        }

        self.commit(tenant_key, Dimension::Requests, 1).await?;
        Ok(())
    }

    /// Add metered tokens to the minute, hour and day token counters
    pub async fn record_tokens(&self, tenant_key_id: &str, tokens: u64) -> CacheResult<()> {
        if tokens == 0 {
            return Ok(());
        }
        let now = self.clock.now_epoch_seconds();
        for window in Window::ALL {
            self.add(tenant_key_id, Dimension::Tokens, window, now, tokens)
                .await?;
        }
        debug!(tenant_key = %tenant_key_id, tokens, "Token usage recorded");
        Ok(())
    }
}
