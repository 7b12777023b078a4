// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Secret Store
//!
//! Durable storage for signing secrets. Every issued token carries the
//! `secret_id` of the record that signed it in its `kid` header, and the
//! authenticator resolves that record at verification time.
//!
//! ## Record Lifecycle
//!
//! - Temporary login secrets are created on a user's first sign-in and
//!   rotated in place on every later sign-in: `secret_id` stays stable while
//!   `secret_key` is regenerated and `expires_at` is refreshed.
//! - Service secrets are created explicitly and may carry no expiry.
//! - Records are never deleted here. Expiry and `status = Disabled` are the
//!   only revocation mechanisms.
//!
//! ## Backends
//!
//! - [`InMemorySecretStore`] - process-local, used by tests and `dev` builds
//! - [`RedbSecretStore`] - embedded ACID database file under `DATA_DIR`

pub mod memory;
pub mod redb_store;

use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

pub use memory::InMemorySecretStore;
pub use redb_store::RedbSecretStore;

/// Length of generated signing keys in bytes (before encoding).
pub const SECRET_KEY_LEN: usize = 64;

/// Status of a secret record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecretStatus {
    /// Secret may be used to verify tokens
    #[default]
    Normal,
    /// Secret is revoked; every token signed with it fails verification
    Disabled,
}

/// What a secret record is used for.
///
/// A user owns at most one live record per temporary purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecretPurpose {
    /// Per-user rotating key backing access tokens
    #[serde(rename = "temporary-login-key")]
    TemporaryLoginKey,
    /// Per-user rotating key backing refresh tokens
    #[serde(rename = "temporary-refresh-key")]
    TemporaryRefreshKey,
    /// Explicitly created, non-rotating secret (service-to-service)
    #[serde(rename = "service")]
    Service,
}

impl SecretPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretPurpose::TemporaryLoginKey => "temporary-login-key",
            SecretPurpose::TemporaryRefreshKey => "temporary-refresh-key",
            SecretPurpose::Service => "service",
        }
    }

    /// Whether records of this purpose are rotated by `upsert`.
    pub fn is_temporary(&self) -> bool {
        !matches!(self, SecretPurpose::Service)
    }
}

impl std::fmt::Display for SecretPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signing secret as persisted by the store.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretRecord {
    /// Globally unique identifier, embedded as `kid` in issued tokens
    pub secret_id: String,
    /// Symmetric signing key material (base64url, system-generated)
    pub secret_key: String,
    /// Principal this secret authenticates
    pub owner_user_id: String,
    /// What the secret backs
    pub purpose: SecretPurpose,
    /// Absolute expiry; `None` only for service secrets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Normal or Disabled
    #[serde(default)]
    pub status: SecretStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by every rotation or status change
    #[serde(default)]
    pub revision: u64,
}

// Key material stays out of logs.
impl std::fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRecord")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<redacted>")
            .field("owner_user_id", &self.owner_user_id)
            .field("purpose", &self.purpose)
            .field("expires_at", &self.expires_at)
            .field("status", &self.status)
            .field("revision", &self.revision)
            .finish()
    }
}

impl SecretRecord {
    /// Build a brand-new record with fresh key material.
    ///
    /// A missing `secret_id` is replaced by a random UUID.
    pub fn generate(
        secret_id: Option<String>,
        owner_user_id: impl Into<String>,
        purpose: SecretPurpose,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Self> {
        let now = Utc::now();
        Ok(Self {
            secret_id: secret_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            secret_key: generate_secret_key()?,
            owner_user_id: owner_user_id.into(),
            purpose,
            expires_at,
            status: SecretStatus::Normal,
            created_at: now,
            updated_at: now,
            revision: 0,
        })
    }

    /// Regenerate the key and refresh the expiry, keeping the identity.
    pub fn rotate(&mut self, expires_at: DateTime<Utc>) -> StoreResult<()> {
        self.secret_key = generate_secret_key()?;
        self.expires_at = Some(expires_at);
        self.touch();
        Ok(())
    }

    pub fn set_status(&mut self, status: SecretStatus) {
        self.status = status;
        self.touch();
    }

    /// Whether this copy reflects a later mutation than `other`.
    pub fn is_newer_than(&self, other: &SecretRecord) -> bool {
        self.revision > other.revision
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.revision = self.revision.saturating_add(1);
    }

    /// Whether the record's own expiry has passed at `now`.
    ///
    /// Records without an expiry never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    pub fn is_disabled(&self) -> bool {
        self.status == SecretStatus::Disabled
    }
}

/// Generate fresh signing key material from the system CSPRNG.
pub fn generate_secret_key() -> StoreResult<String> {
    let mut bytes = [0u8; SECRET_KEY_LEN];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| StoreError::Backend("system random generator unavailable".to_string()))?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Key used to find the live temporary record of an owner.
pub(crate) fn owner_key(purpose: SecretPurpose, owner_user_id: &str) -> String {
    format!("{}|{}", purpose.as_str(), owner_user_id)
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("secret already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid secret request: {0}")]
    Invalid(String),

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Join(String),

    #[error("secret store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Store Contract
// =============================================================================

/// Persistent store of signing secrets.
///
/// Implementations must be safe under concurrent calls. Concurrent `upsert`
/// calls for the same owner and purpose resolve last-writer-wins, never to
/// a torn record or a second live record.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a record by identifier. Fails with [`StoreError::NotFound`].
    async fn get(&self, secret_id: &str) -> StoreResult<SecretRecord>;

    /// Create or rotate the owner's temporary record for `purpose`.
    ///
    /// On rotation `secret_id` and `status` are preserved, `secret_key` is
    /// regenerated and `expires_at` replaced.
    async fn upsert(
        &self,
        owner_user_id: &str,
        purpose: SecretPurpose,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<SecretRecord>;

    /// Create a service secret, optionally with a caller-chosen identifier.
    async fn create(
        &self,
        secret_id: Option<String>,
        owner_user_id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<SecretRecord>;

    /// Change the status of an existing record.
    async fn set_status(&self, secret_id: &str, status: SecretStatus) -> StoreResult<SecretRecord>;
}

/// Reject purposes that `upsert` does not rotate.
pub(crate) fn ensure_temporary(purpose: SecretPurpose) -> StoreResult<()> {
    if purpose.is_temporary() {
        Ok(())
    } else {
        Err(StoreError::Invalid(format!(
            "purpose {purpose} is not rotated by upsert"
        )))
    }
}
