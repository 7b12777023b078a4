// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token revocation (logout / refresh).
//!
//! The authenticator hands raw tokens to a [`RevocationHook`] on logout and
//! asks it whether a token is revoked after a successful verification. The
//! blocklist itself lives behind the hook; [`InMemoryRevocationList`] is the
//! process-local implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::context::{system_clock, Clock};
use crate::secrets::{StoreError, StoreResult};

/// Blocklist of revoked tokens keyed by the raw token value.
#[async_trait]
pub trait RevocationHook: Send + Sync {
    /// Revoke `token` until `expires_at`, after which it fails on expiry anyway.
    async fn revoke(&self, token: &str, expires_at: DateTime<Utc>) -> StoreResult<()>;

    /// Whether `token` has been revoked.
    async fn is_revoked(&self, token: &str) -> StoreResult<bool>;
}

type TokenDigest = [u8; 32];

/// In-memory [`RevocationHook`].
///
/// Tokens are held as SHA-256 digests. Entries past their expiry are pruned
/// on every revoke.
pub struct InMemoryRevocationList {
    revoked: Mutex<HashMap<TokenDigest, DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryRevocationList {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRevocationList {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            revoked: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.revoked
            .lock()
            .map(|revoked| revoked.values().filter(|exp| **exp > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn digest(token: &str) -> TokenDigest {
        Sha256::digest(token.as_bytes()).into()
    }

    fn poisoned() -> StoreError {
        StoreError::Backend("revocation list lock poisoned".to_string())
    }
}

#[async_trait]
impl RevocationHook for InMemoryRevocationList {
    async fn revoke(&self, token: &str, expires_at: DateTime<Utc>) -> StoreResult<()> {
        let now = self.clock.now();
        let mut revoked = self.revoked.lock().map_err(|_| Self::poisoned())?;
        revoked.retain(|_, exp| *exp > now);
        if expires_at > now {
            revoked.insert(Self::digest(token), expires_at);
        }
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> StoreResult<bool> {
        let now = self.clock.now();
        let revoked = self.revoked.lock().map_err(|_| Self::poisoned())?;
        Ok(revoked
            .get(&Self::digest(token))
            .is_some_and(|exp| *exp > now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::context::ManualClock;
    use chrono::Duration;

    #[tokio::test]
    async fn revoked_token_is_reported() {
        let list = InMemoryRevocationList::new();
        let expires = Utc::now() + Duration::minutes(10);

        assert!(!list.is_revoked("tok-a").await.unwrap());
        list.revoke("tok-a", expires).await.unwrap();

        assert!(list.is_revoked("tok-a").await.unwrap());
        assert!(!list.is_revoked("tok-b").await.unwrap());
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn entries_lapse_after_expiry() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let list = InMemoryRevocationList::with_clock(clock.clone());

        list.revoke("tok-a", start + Duration::minutes(1)).await.unwrap();
        clock.advance(Duration::minutes(2));

        assert!(!list.is_revoked("tok-a").await.unwrap());

        // Pruned on the next revoke
        list.revoke("tok-b", start + Duration::minutes(10)).await.unwrap();
        assert_eq!(list.revoked.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn already_expired_tokens_are_not_stored() {
        let list = InMemoryRevocationList::new();
        list.revoke("tok-a", Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
        assert!(list.is_empty());
    }
}
