//! Startup seed for the in-memory credential store.
//!
//! A YAML (or JSON) document listing users, tenant keys and upstream
//! accounts. Tenant keys carry either the raw `api_key`, hashed on load, or
//! a precomputed `key_digest`.
//!
//! ```yaml
//! users:
//!   - id: u1
//!     username: alice
//! tenant_keys:
//!   - id: k1
//!     name: alice-laptop
//!     api_key: sk-relay-alice
//!     user_id: u1
//!     limits:
//!       rate_limit: { requests_per_minute: 60 }
//! accounts:
//!   - id: a1
//!     name: primary
//!     credential: sk-ant-...
//! ```

use gateway_core::{
    AccountStatus, ClientRestrictions, KeyStatus, MemoryCredentialStore, QuotaPolicy, StoreError,
    TenantKey, UpstreamAccount, User,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::auth::hash_api_key;

/// Seed loading errors
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    /// The file could not be read
    #[error("Failed to read seed file {path}: {source}")]
    Io {
        /// Seed file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid YAML/JSON for the seed schema
    #[error("Failed to parse seed file: {0}")]
    Parse(String),

    /// A tenant key has neither `api_key` nor `key_digest`
    #[error("Tenant key {0} needs api_key or key_digest")]
    MissingSecret(String),

    /// A record failed store validation
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Tenant key entry
#[derive(Debug, Clone, Deserialize)]
pub struct SeedTenantKey {
    /// Key id
    pub id: String,
    /// Display name
    pub name: String,
    /// Raw key, hashed on load
    #[serde(default)]
    pub api_key: Option<String>,
    /// Precomputed SHA-256 hex digest
    #[serde(default)]
    pub key_digest: Option<String>,
    /// Owner
    #[serde(default)]
    pub user_id: Option<String>,
    /// Status
    #[serde(default)]
    pub status: KeyStatus,
    /// Quota policy
    #[serde(default)]
    pub limits: Option<QuotaPolicy>,
    /// Client restriction
    #[serde(default)]
    pub client_restrictions: Option<ClientRestrictions>,
}

impl SeedTenantKey {
    fn into_tenant_key(self) -> Result<TenantKey, SeedError> {
        let digest = match (self.key_digest, self.api_key) {
            (Some(digest), _) => digest.to_ascii_lowercase(),
            (None, Some(raw)) => hash_api_key(&raw),
            (None, None) => return Err(SeedError::MissingSecret(self.id)),
        };

        let mut key = TenantKey::new(self.id, self.name, digest).with_status(self.status);
        key.user_id = self.user_id;
        key.limits = self.limits;
        key.client_restrictions = self.client_restrictions;
        Ok(key)
    }
}

/// Upstream account entry
#[derive(Debug, Clone, Deserialize)]
pub struct SeedAccount {
    /// Account id
    pub id: String,
    /// Display name
    pub name: String,
    /// Provider credential
    pub credential: String,
    /// Outbound proxy URL
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// Account group
    #[serde(default)]
    pub group_id: Option<String>,
    /// Status
    #[serde(default)]
    pub status: AccountStatus,
}

impl SeedAccount {
    fn into_account(self) -> UpstreamAccount {
        let mut account =
            UpstreamAccount::new(self.id, self.name, self.credential).with_status(self.status);
        if let Some(url) = self.proxy_url {
            account = account.with_proxy(url);
        }
        if let Some(group) = self.group_id {
            account = account.with_group(group);
        }
        account
    }
}

/// Seed document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedData {
    /// Users
    #[serde(default)]
    pub users: Vec<User>,
    /// Tenant keys
    #[serde(default)]
    pub tenant_keys: Vec<SeedTenantKey>,
    /// Upstream accounts
    #[serde(default)]
    pub accounts: Vec<SeedAccount>,
}

impl SeedData {
    /// Parse a seed document
    ///
    /// # Errors
    /// Returns error if the document does not match the seed schema
    pub fn parse(contents: &str) -> Result<Self, SeedError> {
        serde_yaml::from_str(contents).map_err(|e| SeedError::Parse(e.to_string()))
    }

    /// Read and parse a seed file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SeedError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&contents)
    }

    /// Insert every entry into `store`
    ///
    /// # Errors
    /// Returns error on the first entry that fails validation
    pub fn apply(self, store: &MemoryCredentialStore) -> Result<(), SeedError> {
        let (users, keys, accounts) = (
            self.users.len(),
            self.tenant_keys.len(),
            self.accounts.len(),
        );

        for user in self.users {
            store.insert_user(user);
        }
        for key in self.tenant_keys {
            store.insert_tenant_key(key.into_tenant_key()?)?;
        }
        for account in self.accounts {
            store.insert_account(account.into_account());
        }

        info!(users, tenant_keys = keys, accounts, "Credential store seeded");
        Ok(())
    }
}
