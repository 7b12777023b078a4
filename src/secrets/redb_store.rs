// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded secret database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `secrets`: secret_id → serialized SecretRecord (JSON bytes)
//! - `owner_index`: `purpose|owner_user_id` → secret_id
//!
//! Each mutation runs in a single write transaction. redb serializes write
//! transactions, which makes `upsert` last-writer-wins for a given owner.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::{
    ensure_temporary, owner_key, SecretPurpose, SecretRecord, SecretStatus, SecretStore,
    StoreError, StoreResult,
};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: secret_id → serialized SecretRecord.
const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");

/// Index: `purpose|owner_user_id` → secret_id of the live temporary record.
const OWNER_INDEX: TableDefinition<&str, &str> = TableDefinition::new("owner_index");

// =============================================================================
// RedbSecretStore
// =============================================================================

/// Durable [`SecretStore`] in a single redb file.
#[derive(Clone)]
pub struct RedbSecretStore {
    db: Arc<Database>,
}

impl RedbSecretStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Backend(format!("cannot create {}: {e}", parent.display())))?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SECRETS)?;
            let _ = write_txn.open_table(OWNER_INDEX)?;
        }
        write_txn.commit()?;

        tracing::info!(path = %path.display(), "Secret database opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Run blocking database work off the async executor.
    async fn blocking<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || work(&db))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

fn read_record(db: &Database, secret_id: &str) -> StoreResult<SecretRecord> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(SECRETS)?;
    match table.get(secret_id)? {
        Some(value) => Ok(serde_json::from_slice(value.value())?),
        None => Err(StoreError::NotFound(secret_id.to_string())),
    }
}

fn upsert_record(
    db: &Database,
    owner_user_id: &str,
    purpose: SecretPurpose,
    expires_at: DateTime<Utc>,
) -> StoreResult<SecretRecord> {
    let index_key = owner_key(purpose, owner_user_id);

    let write_txn = db.begin_write()?;
    let record = {
        let mut secrets = write_txn.open_table(SECRETS)?;
        let mut index = write_txn.open_table(OWNER_INDEX)?;

        let existing_id = index.get(index_key.as_str())?.map(|v| v.value().to_string());
        let existing = match existing_id {
            Some(id) => secrets
                .get(id.as_str())?
                .map(|v| serde_json::from_slice::<SecretRecord>(v.value()))
                .transpose()?,
            None => None,
        };

        let record = match existing {
            Some(mut record) => {
                record.rotate(expires_at)?;
                record
            }
            None => SecretRecord::generate(None, owner_user_id, purpose, Some(expires_at))?,
        };

        let json = serde_json::to_vec(&record)?;
        secrets.insert(record.secret_id.as_str(), json.as_slice())?;
        index.insert(index_key.as_str(), record.secret_id.as_str())?;
        record
    };
    write_txn.commit()?;
    Ok(record)
}

fn insert_new(db: &Database, record: SecretRecord) -> StoreResult<SecretRecord> {
    let write_txn = db.begin_write()?;
    {
        let mut secrets = write_txn.open_table(SECRETS)?;
        if secrets.get(record.secret_id.as_str())?.is_some() {
            return Err(StoreError::AlreadyExists(record.secret_id));
        }
        let json = serde_json::to_vec(&record)?;
        secrets.insert(record.secret_id.as_str(), json.as_slice())?;
    }
    write_txn.commit()?;
    Ok(record)
}

fn update_status(db: &Database, secret_id: &str, status: SecretStatus) -> StoreResult<SecretRecord> {
    let write_txn = db.begin_write()?;
    let record = {
        let mut secrets = write_txn.open_table(SECRETS)?;
        let mut record: SecretRecord = match secrets.get(secret_id)? {
            Some(value) => serde_json::from_slice(value.value())?,
            None => return Err(StoreError::NotFound(secret_id.to_string())),
        };
        record.set_status(status);
        let json = serde_json::to_vec(&record)?;
        secrets.insert(secret_id, json.as_slice())?;
        record
    };
    write_txn.commit()?;
    Ok(record)
}

#[async_trait]
impl SecretStore for RedbSecretStore {
    async fn get(&self, secret_id: &str) -> StoreResult<SecretRecord> {
        let secret_id = secret_id.to_string();
        self.blocking(move |db| read_record(db, &secret_id)).await
    }

    async fn upsert(
        &self,
        owner_user_id: &str,
        purpose: SecretPurpose,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<SecretRecord> {
        ensure_temporary(purpose)?;
        let owner_user_id = owner_user_id.to_string();
        self.blocking(move |db| upsert_record(db, &owner_user_id, purpose, expires_at))
            .await
    }

    async fn create(
        &self,
        secret_id: Option<String>,
        owner_user_id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<SecretRecord> {
        let record =
            SecretRecord::generate(secret_id, owner_user_id, SecretPurpose::Service, expires_at)?;
        self.blocking(move |db| insert_new(db, record)).await
    }

    async fn set_status(&self, secret_id: &str, status: SecretStatus) -> StoreResult<SecretRecord> {
        let secret_id = secret_id.to_string();
        self.blocking(move |db| update_status(db, &secret_id, status))
            .await
    }
}
