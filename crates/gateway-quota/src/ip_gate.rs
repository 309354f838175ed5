//! Per-source-address admission gate.
//!
//! Runs before tenant resolution, so it also throttles unauthenticated
//! traffic. One counter per address per minute bucket, kept in a cache of
//! its own so address churn cannot crowd out tenant counters.

use gateway_core::cache::{get_counter, set_counter};
use gateway_core::{CacheError, Clock, GatewayError, GatewayResult, TtlCache, Window};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::ledger::{bucket_index, retry_after};

/// Fixed-ceiling per-IP request gate
#[derive(Clone)]
pub struct IpGate {
    cache: Arc<dyn TtlCache>,
    clock: Arc<dyn Clock>,
    requests_per_minute: u64,
}

impl std::fmt::Debug for IpGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpGate")
            .field("requests_per_minute", &self.requests_per_minute)
            .finish_non_exhaustive()
    }
}

impl IpGate {
    /// Create a gate allowing `requests_per_minute` per address
    pub fn new(cache: Arc<dyn TtlCache>, clock: Arc<dyn Clock>, requests_per_minute: u64) -> Self {
        Self {
            cache,
            clock,
            requests_per_minute,
        }
    }

    /// Configured ceiling
    #[must_use]
    pub fn requests_per_minute(&self) -> u64 {
        self.requests_per_minute
    }

    fn key(addr: &str, bucket: u64) -> String {
        format!("ip:{addr}:{bucket}")
    }

    /// Count one request from `addr`, rejecting it once the ceiling is reached
    pub async fn admit(&self, addr: &str) -> GatewayResult<()> {
        let now = self.clock.now_epoch_seconds();
        let key = Self::key(addr, bucket_index(now, Window::Minute));
        let cache = self.cache.as_ref();

        let count = get_counter(cache, &key).await?;
        if count >= self.requests_per_minute {
            warn!(client_ip = %addr, count, "IP rate limit exceeded");
            return Err(GatewayError::quota_exceeded(
                "Too many requests from this IP address",
                retry_after(now, Window::Minute),
            ));
        }

        let written = set_counter(
            cache,
            &key,
            count + 1,
            Duration::from_secs(Window::Minute.seconds()),
        )
        .await;
        match written {
            Ok(()) => Ok(()),
            Err(CacheError::Full { capacity }) => {
                warn!(client_ip = %addr, capacity, "IP gate at capacity, refusing new address");
                Err(GatewayError::quota_exceeded(
                    "Too many distinct client addresses",
                    retry_after(now, Window::Minute),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }
}
