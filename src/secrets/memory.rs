// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Process-local secret store.
//!
//! Holds every record behind a single `RwLock`, so an upsert (index lookup,
//! rotation and write) is atomic with respect to concurrent callers.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    ensure_temporary, owner_key, SecretPurpose, SecretRecord, SecretStatus, SecretStore,
    StoreError, StoreResult,
};

#[derive(Default)]
struct Inner {
    /// secret_id → record
    secrets: HashMap<String, SecretRecord>,
    /// "purpose|owner" → secret_id
    owners: HashMap<String, String>,
}

/// In-memory [`SecretStore`].
#[derive(Default)]
pub struct InMemorySecretStore {
    inner: RwLock<Inner>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub async fn len(&self) -> usize {
        self.inner.read().await.secrets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(&self, secret_id: &str) -> StoreResult<SecretRecord> {
        self.inner
            .read()
            .await
            .secrets
            .get(secret_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(secret_id.to_string()))
    }

    async fn upsert(
        &self,
        owner_user_id: &str,
        purpose: SecretPurpose,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<SecretRecord> {
        ensure_temporary(purpose)?;
        let key = owner_key(purpose, owner_user_id);

        let mut inner = self.inner.write().await;
        let existing = inner.owners.get(&key).cloned();

        if let Some(secret_id) = existing {
            if let Some(record) = inner.secrets.get_mut(&secret_id) {
                record.rotate(expires_at)?;
                return Ok(record.clone());
            }
        }

        let record = SecretRecord::generate(None, owner_user_id, purpose, Some(expires_at))?;
        inner.owners.insert(key, record.secret_id.clone());
        inner.secrets.insert(record.secret_id.clone(), record.clone());
        Ok(record)
    }

    async fn create(
        &self,
        secret_id: Option<String>,
        owner_user_id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<SecretRecord> {
        let record =
            SecretRecord::generate(secret_id, owner_user_id, SecretPurpose::Service, expires_at)?;

        let mut inner = self.inner.write().await;
        if inner.secrets.contains_key(&record.secret_id) {
            return Err(StoreError::AlreadyExists(record.secret_id));
        }
        inner.secrets.insert(record.secret_id.clone(), record.clone());
        Ok(record)
    }

    async fn set_status(&self, secret_id: &str, status: SecretStatus) -> StoreResult<SecretRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .secrets
            .get_mut(secret_id)
            .ok_or_else(|| StoreError::NotFound(secret_id.to_string()))?;
        record.set_status(status);
        Ok(record.clone())
    }
}
