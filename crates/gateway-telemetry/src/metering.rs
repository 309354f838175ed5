//! Usage metering.
//!
//! One usage record per completed upstream call, then the token counters.
//! The request path never waits on metering: callers use [`UsageMeter::spawn`].

use chrono::Utc;
use gateway_core::{CredentialStore, GatewayResult, TokenUsage, UsageRecord};
use gateway_quota::QuotaLedger;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::cost::PricingTable;

/// One completed upstream call to be metered
#[derive(Debug, Clone)]
pub struct MeteredCall {
    /// Tenant key that made the call
    pub tenant_key_id: String,
    /// Model as requested
    pub model: String,
    /// Tokens reported by the upstream
    pub usage: TokenUsage,
    /// Upstream account that served it
    pub account_id: Option<String>,
    /// Gateway request id
    pub request_id: String,
}

/// Writes usage records and token counters
#[derive(Clone)]
pub struct UsageMeter {
    store: Arc<dyn CredentialStore>,
    ledger: QuotaLedger,
    pricing: Arc<PricingTable>,
}

impl std::fmt::Debug for UsageMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageMeter")
            .field("store", &self.store.name())
            .field("priced_models", &self.pricing.len())
            .finish_non_exhaustive()
    }
}

impl UsageMeter {
    /// Create a meter
    pub fn new(store: Arc<dyn CredentialStore>, ledger: QuotaLedger, pricing: PricingTable) -> Self {
        Self {
            store,
            ledger,
            pricing: Arc::new(pricing),
        }
    }

    /// Pricing in use
    #[must_use]
    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Append a usage record, then add its tokens to the quota counters.
    ///
    /// A counter write failure is logged and does not fail the call; the
    /// record is already persisted at that point.
    pub async fn record(&self, call: MeteredCall) -> GatewayResult<UsageRecord> {
        let cost = self.pricing.calculate_cost(
            &call.model,
            call.usage.input_tokens,
            call.usage.output_tokens,
        );
        let record = UsageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_key_id: call.tenant_key_id,
            model: call.model,
            input_tokens: call.usage.input_tokens,
            output_tokens: call.usage.output_tokens,
            cost,
            account_id: call.account_id,
            request_id: call.request_id,
            timestamp: Utc::now(),
        };

        self.store.append_usage_record(record.clone()).await?;

        if let Err(e) = self
            .ledger
            .record_tokens(&record.tenant_key_id, record.total_tokens())
            .await
        {
            warn!(
                tenant_key_id = %record.tenant_key_id,
                error = %e,
                "Failed to update token counters"
            );
        }

        debug!(
            tenant_key_id = %record.tenant_key_id,
            model = %record.model,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            cost = record.cost,
            "Usage recorded"
        );
        Ok(record)
    }

    /// Meter in the background
    pub fn spawn(&self, call: MeteredCall) -> JoinHandle<()> {
        let meter = self.clone();
        tokio::spawn(async move {
            let request_id = call.request_id.clone();
            if let Err(e) = meter.record(call).await {
                error!(request_id = %request_id, error = %e, "Failed to record usage");
            }
        })
    }
}
