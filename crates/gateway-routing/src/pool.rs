//! Upstream account pool.
//!
//! Every selection reads the active set from the credential store, so a
//! status change made by one request is visible to the next one.

use chrono::Utc;
use gateway_core::{
    AccountPatch, AccountStatus, CredentialStore, GatewayError, GatewayResult, UpstreamAccount,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::strategy::{SelectionStrategy, UniformRandom};

/// Why a relay through an account failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Upstream rejected the credential (HTTP 401)
    Authentication,
    /// Upstream returned another non-success status
    Upstream(u16),
    /// Connection, TLS or timeout failure
    Transport,
}

impl FailureKind {
    /// Classify an upstream status code
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        if status == 401 {
            Self::Authentication
        } else {
            Self::Upstream(status)
        }
    }
}

/// Pool of upstream accounts backed by the credential store
#[derive(Clone)]
pub struct UpstreamPool {
    store: Arc<dyn CredentialStore>,
    strategy: Arc<dyn SelectionStrategy>,
    group: Option<String>,
}

impl std::fmt::Debug for UpstreamPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamPool")
            .field("store", &self.store.name())
            .field("strategy", &self.strategy.name())
            .field("group", &self.group)
            .finish()
    }
}

impl UpstreamPool {
    /// Create a pool using uniform random selection over all groups
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            strategy: Arc::new(UniformRandom),
            group: None,
        }
    }

    /// Replace the selection strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn SelectionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Restrict selection to one account group
    #[must_use]
    pub fn with_group(mut self, group: Option<String>) -> Self {
        self.group = group;
        self
    }

    /// Active accounts eligible for selection
    pub async fn candidates(&self) -> GatewayResult<Vec<UpstreamAccount>> {
        let mut accounts = self
            .store
            .get_accounts_by_status(AccountStatus::Active)
            .await?;
        accounts.retain(|a| a.status == AccountStatus::Active && self.in_group(a));
        Ok(accounts)
    }

    fn in_group(&self, account: &UpstreamAccount) -> bool {
        self.group
            .as_deref()
            .map_or(true, |g| account.group_id.as_deref() == Some(g))
    }

    /// Count the accounts in the configured group
    pub async fn summary(&self) -> GatewayResult<PoolSummary> {
        let active = self.candidates().await?.len();
        let mut total = active;
        for status in [AccountStatus::Inactive, AccountStatus::Invalid] {
            let accounts = self.store.get_accounts_by_status(status).await?;
            total += accounts.iter().filter(|a| self.in_group(a)).count();
        }
        Ok(PoolSummary { total, active })
    }

    /// Pick one active account
    pub async fn select(&self) -> GatewayResult<UpstreamAccount> {
        let mut candidates = self.candidates().await?;
        if candidates.is_empty() {
            warn!(group = ?self.group, "No active upstream accounts");
            return Err(GatewayError::NoUpstreamAvailable);
        }

        let index = self
            .strategy
            .choose(&candidates)
            .filter(|&i| i < candidates.len())
            .ok_or(GatewayError::NoUpstreamAvailable)?;
        let account = candidates.swap_remove(index);

        debug!(
            account_id = %account.id,
            strategy = self.strategy.name(),
            pool_size = candidates.len() + 1,
            "Selected upstream account"
        );
        Ok(account)
    }

    /// Record a failed relay through `account_id`.
    ///
    /// Authentication failures take the account out of rotation; anything
    /// else only bumps its error counter.
    pub async fn report_failure(&self, account_id: &str, kind: FailureKind) -> GatewayResult<()> {
        match kind {
            FailureKind::Authentication => {
                self.store
                    .update_account(account_id, AccountPatch::status(AccountStatus::Invalid))
                    .await?;
                warn!(account_id, "Upstream rejected credential, account marked invalid");
            }
            FailureKind::Upstream(_) | FailureKind::Transport => {
                let Some(account) = self.store.get_account_by_id(account_id).await? else {
                    return Ok(());
                };
                let error_count = account.error_count.saturating_add(1);
                self.store
                    .update_account(account_id, AccountPatch::error_count(error_count))
                    .await?;
                info!(account_id, ?kind, error_count, "Upstream failure recorded");
            }
        }
        Ok(())
    }

    /// Record a successful relay through `account_id`
    pub async fn report_success(&self, account_id: &str) -> GatewayResult<()> {
        self.store
            .update_account(account_id, AccountPatch::last_used_at(Utc::now()))
            .await?;
        Ok(())
    }
}

/// Account counts reported by [`UpstreamPool::summary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolSummary {
    /// Accounts in the group, whatever their status
    pub total: usize,
    /// Accounts eligible for selection
    pub active: usize,
}
