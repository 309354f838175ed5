//! Credential store contract.
//!
//! The gateway never owns persistent data. Tenant keys, users, upstream
//! accounts, usage records and settings live behind [`CredentialStore`];
//! calls are plain request/response with no cross-call transactions.
//!
//! [`MemoryCredentialStore`] backs tests and single-node deployments.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::error::GatewayError;
use crate::types::{
    AccountPatch, AccountStatus, TenantKey, UpstreamAccount, UsageFilter, UsageRecord, User,
};

/// Error types for store operations
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Backend could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Referenced record does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Record failed boundary validation
    #[error("Invalid record {id}: {reason}")]
    InvalidRecord {
        /// Record identifier
        id: String,
        /// Why validation failed
        reason: String,
    },
}

impl StoreError {
    /// Create an invalid record error
    pub fn invalid_record(id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        Self::internal(err.to_string())
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent record store consumed by the gateway
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a tenant key by the digest of the presented key
    async fn get_tenant_key_by_digest(&self, digest: &str) -> StoreResult<Option<TenantKey>>;

    /// Look up a tenant key by identifier
    async fn get_tenant_key_by_id(&self, id: &str) -> StoreResult<Option<TenantKey>>;

    /// Look up a user by identifier
    async fn get_user_by_id(&self, id: &str) -> StoreResult<Option<User>>;

    /// All upstream accounts in the given status
    async fn get_accounts_by_status(&self, status: AccountStatus)
        -> StoreResult<Vec<UpstreamAccount>>;

    /// Look up an upstream account by identifier
    async fn get_account_by_id(&self, id: &str) -> StoreResult<Option<UpstreamAccount>>;

    /// Apply a partial update and return the updated account
    async fn update_account(&self, id: &str, patch: AccountPatch) -> StoreResult<UpstreamAccount>;

    /// Append one usage record
    async fn append_usage_record(&self, record: UsageRecord) -> StoreResult<()>;

    /// Usage records matching a filter, newest first
    async fn list_usage_records(&self, filter: &UsageFilter) -> StoreResult<Vec<UsageRecord>>;

    /// Read a named setting
    async fn query_setting(&self, name: &str) -> StoreResult<Option<Value>>;

    /// Write a named setting, replacing any previous value
    async fn write_setting(&self, name: &str, value: Value) -> StoreResult<()>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

#[derive(Default)]
struct MemoryTables {
    keys: HashMap<String, TenantKey>,
    users: HashMap<String, User>,
    accounts: HashMap<String, UpstreamAccount>,
    usage: Vec<UsageRecord>,
    settings: HashMap<String, Value>,
}

/// In-memory credential store
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    tables: Arc<RwLock<MemoryTables>>,
}

impl MemoryCredentialStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tenant key after validating it
    pub fn insert_tenant_key(&self, key: TenantKey) -> StoreResult<()> {
        key.validate()?;
        self.tables.write().keys.insert(key.id.clone(), key);
        Ok(())
    }

    /// Insert or replace a user
    pub fn insert_user(&self, user: User) {
        self.tables.write().users.insert(user.id.clone(), user);
    }

    /// Insert or replace an upstream account
    pub fn insert_account(&self, account: UpstreamAccount) {
        self.tables.write().accounts.insert(account.id.clone(), account);
    }

    /// Number of usage records appended so far
    #[must_use]
    pub fn usage_count(&self) -> usize {
        self.tables.read().usage.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_tenant_key_by_digest(&self, digest: &str) -> StoreResult<Option<TenantKey>> {
        let tables = self.tables.read();
        tables
            .keys
            .values()
            .find(|k| k.key_digest == digest)
            .cloned()
            .map(|k| k.validate().map(|()| k))
            .transpose()
    }

    async fn get_tenant_key_by_id(&self, id: &str) -> StoreResult<Option<TenantKey>> {
        let tables = self.tables.read();
        tables
            .keys
            .get(id)
            .cloned()
            .map(|k| k.validate().map(|()| k))
            .transpose()
    }

    async fn get_user_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.tables.read().users.get(id).cloned())
    }

    async fn get_accounts_by_status(
        &self,
        status: AccountStatus,
    ) -> StoreResult<Vec<UpstreamAccount>> {
        let tables = self.tables.read();
        let mut accounts: Vec<_> = tables
            .accounts
            .values()
            .filter(|a| a.status == status)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }

    async fn get_account_by_id(&self, id: &str) -> StoreResult<Option<UpstreamAccount>> {
        Ok(self.tables.read().accounts.get(id).cloned())
    }

    async fn update_account(&self, id: &str, patch: AccountPatch) -> StoreResult<UpstreamAccount> {
        let mut tables = self.tables.write();
        let account = tables
            .accounts
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;
        account.apply(&patch);
        Ok(account.clone())
    }

    async fn append_usage_record(&self, record: UsageRecord) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if let Some(key) = tables.keys.get_mut(&record.tenant_key_id) {
            key.total_requests += 1;
            key.total_tokens += record.total_tokens();
            key.updated_at = record.timestamp;
        }
        tables.usage.push(record);
        Ok(())
    }

    async fn list_usage_records(&self, filter: &UsageFilter) -> StoreResult<Vec<UsageRecord>> {
        let tables = self.tables.read();
        let mut records: Vec<_> = tables
            .usage
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn query_setting(&self, name: &str) -> StoreResult<Option<Value>> {
        Ok(self.tables.read().settings.get(name).cloned())
    }

    async fn write_setting(&self, name: &str, value: Value) -> StoreResult<()> {
        self.tables.write().settings.insert(name.to_string(), value);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
