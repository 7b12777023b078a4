// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache for signing secrets resolved by `kid`.
//!
//! Sits in front of the secret store so that verifying a token does not cost
//! a store round-trip. The cache is a read-through accelerator only: callers
//! re-check `status` and `expires_at` on every use, hit or miss.
//!
//! A single mutex guards the LRU map and its recency list together. An
//! optional TTL bounds how long a record rotated or disabled by another
//! process can keep being served from here.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::secrets::SecretRecord;

/// Default number of secrets kept in memory.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Cached entry: secret record + insertion timestamp.
struct CacheEntry {
    record: SecretRecord,
    inserted_at: Instant,
}

/// In-process LRU cache of secret records keyed by `secret_id`.
pub struct SecretCache {
    cache: Mutex<LruCache<String, CacheEntry>>,
    ttl: Option<Duration>,
}

impl SecretCache {
    /// Create a new cache with the given capacity and optional TTL.
    ///
    /// - `capacity`: Max number of secrets to cache (at least 1).
    /// - `ttl`: Time-to-live for each entry; `None` keeps entries until evicted.
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    /// Get a cached secret, promoting it to most-recently-used.
    ///
    /// Returns `None` if not cached or expired.
    pub fn get(&self, secret_id: &str) -> Option<SecretRecord> {
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(secret_id) {
            if self.ttl.is_none_or(|ttl| entry.inserted_at.elapsed() < ttl) {
                return Some(entry.record.clone());
            }
            // Expired, remove it
            cache.pop(secret_id);
        }
        None
    }

    /// Insert or overwrite a secret, evicting the least-recently-used entry
    /// when full.
    pub fn put(&self, secret_id: &str, record: SecretRecord) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                secret_id.to_string(),
                CacheEntry {
                    record,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    /// Insert `record` unless the cache already holds a later revision.
    ///
    /// Used for write-backs after a store read, which may finish after a
    /// rotation on this instance has already written the newer record.
    /// Returns whether `record` was stored.
    pub fn put_if_newer(&self, secret_id: &str, record: SecretRecord) -> bool {
        let Ok(mut cache) = self.cache.lock() else {
            return false;
        };
        if let Some(entry) = cache.peek(secret_id) {
            let live = self.ttl.is_none_or(|ttl| entry.inserted_at.elapsed() < ttl);
            if live && entry.record.is_newer_than(&record) {
                return false;
            }
        }
        cache.put(
            secret_id.to_string(),
            CacheEntry {
                record,
                inserted_at: Instant::now(),
            },
        );
        true
    }

    /// Drop a secret from the cache.
    pub fn invalidate(&self, secret_id: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(secret_id);
        }
    }

    /// Whether a secret is currently cached, without touching recency.
    pub fn contains(&self, secret_id: &str) -> bool {
        self.cache
            .lock()
            .map(|cache| cache.contains(secret_id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cache
            .lock()
            .map(|cache| cache.cap().get())
            .unwrap_or(0)
    }
}
