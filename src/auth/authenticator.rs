// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Dynamic-secret authenticator.
//!
//! ## Sign
//!
//! 1. Upsert the user's temporary secret for each token kind. This rotates
//!    the signing key in place, so every earlier token of that kind stops
//!    verifying.
//! 2. Write the rotated record through to the cache.
//! 3. Sign `{sub, iss, iat, exp}` with `kid = secret_id`.
//!
//! ## Verify
//!
//! header (`alg`, `kid`) → cache → store → status → purpose → secret expiry
//! → signature → claim expiry → revocation hook.
//!
//! ## Cache staleness
//!
//! Rotation on this instance is visible immediately (write-through). Another
//! instance sharing the same store keeps serving its cached copy for at most
//! the cache TTL.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::cache::{SecretCache, DEFAULT_CAPACITY};
use super::claims::{TokenClaims, TokenKind};
use super::codec::TokenCodec;
use super::context::{system_clock, AuthContext, Clock};
use super::revocation::RevocationHook;
use super::AuthError;
use crate::secrets::{SecretPurpose, SecretRecord, SecretStatus, SecretStore};

/// Token type reported to clients.
pub const TOKEN_TYPE: &str = "Bearer";

/// Authenticator settings.
#[derive(Debug, Clone)]
pub struct AuthenticatorConfig {
    /// `iss` claim written and expected
    pub issuer: String,
    /// HMAC algorithm used for signing
    pub algorithm: Algorithm,
    /// Lifetime of access tokens
    pub access_ttl: Duration,
    /// Lifetime of refresh tokens
    pub refresh_ttl: Duration,
    /// Max number of secrets kept in the cache
    pub cache_capacity: usize,
    /// Max age of a cached secret; `None` keeps it until evicted
    pub cache_ttl: Option<Duration>,
    /// Upper bound for each store call
    pub store_timeout: Option<Duration>,
    /// Clock skew tolerated on expiry checks, in seconds
    pub leeway_secs: u64,
}

impl Default for AuthenticatorConfig {
    fn default() -> Self {
        Self {
            issuer: "authn-server".to_string(),
            algorithm: Algorithm::HS512,
            access_ttl: Duration::from_secs(2 * 60 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            cache_capacity: DEFAULT_CAPACITY,
            cache_ttl: Some(Duration::from_secs(60)),
            store_timeout: Some(Duration::from_secs(2)),
            leeway_secs: 0,
        }
    }
}

/// Access and refresh token pair returned by [`Authenticator::sign`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IssuedTokens {
    /// Short-lived token for protected requests
    pub access_token: String,
    /// Long-lived token for obtaining a new pair
    pub refresh_token: String,
    /// Always "Bearer"
    pub token_type: String,
    /// Access token expiry (Unix seconds)
    pub expires_at: i64,
    /// Refresh token expiry (Unix seconds)
    pub refresh_expires_at: i64,
}

/// Issues and verifies tokens signed with per-user rotating secrets.
///
/// Owns its cache; separate instances never share cached state.
pub struct Authenticator {
    store: Arc<dyn SecretStore>,
    cache: SecretCache,
    codec: TokenCodec,
    config: AuthenticatorConfig,
    clock: Arc<dyn Clock>,
    revocation: Option<Arc<dyn RevocationHook>>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn SecretStore>, config: AuthenticatorConfig) -> Result<Self, AuthError> {
        let codec = TokenCodec::new(config.algorithm, config.issuer.clone())?
            .with_leeway(config.leeway_secs);
        Ok(Self {
            store,
            cache: SecretCache::new(config.cache_capacity, config.cache_ttl),
            codec,
            config,
            clock: system_clock(),
            revocation: None,
        })
    }

    /// Replace the clock used for every expiry decision.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Install the blocklist consulted after verification and fed by `destroy`.
    pub fn with_revocation(mut self, hook: Arc<dyn RevocationHook>) -> Self {
        self.revocation = Some(hook);
        self
    }

    pub fn config(&self) -> &AuthenticatorConfig {
        &self.config
    }

    pub fn cache(&self) -> &SecretCache {
        &self.cache
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    // =========================================================================
    // Issuance
    // =========================================================================

    /// Issue a fresh access/refresh pair for `user_id`, rotating both keys.
    ///
    /// Fails with `SecretDisabled` when either of the user's secrets has been
    /// disabled, since any token signed with it would be rejected.
    pub async fn sign(&self, ctx: &AuthContext, user_id: &str) -> Result<IssuedTokens, AuthError> {
        let now = self.clock.now();

        let (access_token, expires_at) = self
            .issue(ctx, user_id, SecretPurpose::TemporaryLoginKey, now, self.config.access_ttl)
            .await?;
        let (refresh_token, refresh_expires_at) = self
            .issue(ctx, user_id, SecretPurpose::TemporaryRefreshKey, now, self.config.refresh_ttl)
            .await?;

        tracing::info!(user_id = %user_id, expires_at = %expires_at, "Issued token pair");

        Ok(IssuedTokens {
            access_token,
            refresh_token,
            token_type: TOKEN_TYPE.to_string(),
            expires_at: expires_at.timestamp(),
            refresh_expires_at: refresh_expires_at.timestamp(),
        })
    }

    /// Sign an access token with an existing service secret.
    ///
    /// The token expires with the secret, or after the access TTL when that
    /// comes first.
    pub async fn sign_service(&self, ctx: &AuthContext, secret_id: &str) -> Result<String, AuthError> {
        let now = self.clock.now();
        let secret = self.resolve_secret(ctx, secret_id).await?;
        self.check_usable(&secret, TokenKind::Access, now)?;

        let mut expires_at = expiry(now, self.config.access_ttl)?;
        if let Some(secret_expiry) = secret.expires_at {
            expires_at = expires_at.min(secret_expiry);
        }

        let claims = TokenClaims::new(&secret.owner_user_id, self.codec.issuer(), now, expires_at);
        self.codec.encode(&secret.secret_key, &secret.secret_id, &claims)
    }

    async fn issue(
        &self,
        ctx: &AuthContext,
        user_id: &str,
        purpose: SecretPurpose,
        now: DateTime<Utc>,
        lifetime: Duration,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let expires_at = expiry(now, lifetime)?;

        let secret = ctx
            .run(self.config.store_timeout, self.store.upsert(user_id, purpose, expires_at))
            .await
            .inspect_err(|e| {
                tracing::error!(user_id = %user_id, purpose = %purpose, error = %e, "Failed to rotate signing secret");
            })?;

        self.cache.put_if_newer(&secret.secret_id, secret.clone());
        if secret.is_disabled() {
            tracing::warn!(user_id = %user_id, purpose = %purpose, "Refused to sign with a disabled secret");
            return Err(AuthError::SecretDisabled);
        }

        let claims = TokenClaims::new(user_id, self.codec.issuer(), now, expires_at);
        let token = self.codec.encode(&secret.secret_key, &secret.secret_id, &claims)?;
        Ok((token, expires_at))
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Verify an access token and return its user ID.
    pub async fn verify(&self, ctx: &AuthContext, token: &str) -> Result<String, AuthError> {
        self.verify_kind(ctx, token, TokenKind::Access)
            .await
            .map(|claims| claims.sub)
    }

    /// Verify a refresh token and return its user ID.
    ///
    /// Access tokens are not accepted here, and refresh tokens are not
    /// accepted by [`Authenticator::verify`].
    pub async fn verify_refresh(&self, ctx: &AuthContext, token: &str) -> Result<String, AuthError> {
        self.verify_kind(ctx, token, TokenKind::Refresh)
            .await
            .map(|claims| claims.sub)
    }

    /// Verify a token of the given kind and return its claims.
    pub async fn verify_claims(
        &self,
        ctx: &AuthContext,
        token: &str,
        kind: TokenKind,
    ) -> Result<TokenClaims, AuthError> {
        self.verify_kind(ctx, token, kind).await
    }

    async fn verify_kind(
        &self,
        ctx: &AuthContext,
        token: &str,
        kind: TokenKind,
    ) -> Result<TokenClaims, AuthError> {
        let now = self.clock.now();

        let claims = self
            .codec
            .verify_with(token, now, |header| async move {
                let secret = self.resolve_secret(ctx, &header.kid).await?;
                self.check_usable(&secret, kind, now)?;
                Ok(secret.secret_key)
            })
            .await
            .inspect_err(|e| log_rejection(e, kind))?;

        if let Some(hook) = &self.revocation {
            if ctx.run(self.config.store_timeout, hook.is_revoked(token)).await? {
                tracing::debug!(user_id = %claims.sub, "Rejected revoked token");
                return Err(AuthError::TokenRevoked);
            }
        }

        Ok(claims)
    }

    /// Status, purpose and expiry checks, applied on every use of a secret.
    fn check_usable(&self, secret: &SecretRecord, kind: TokenKind, now: DateTime<Utc>) -> Result<(), AuthError> {
        if secret.is_disabled() {
            return Err(AuthError::SecretDisabled);
        }
        if !accepts(kind, secret.purpose) {
            return Err(AuthError::TokenKindMismatch);
        }
        let skewed = chrono::Duration::try_seconds(self.codec.leeway())
            .and_then(|leeway| now.checked_sub_signed(leeway))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        if secret.is_expired(skewed) {
            return Err(AuthError::TokenExpired);
        }
        Ok(())
    }

    /// Look a secret up by `kid`: cache first, then the store.
    async fn resolve_secret(&self, ctx: &AuthContext, secret_id: &str) -> Result<SecretRecord, AuthError> {
        if let Some(secret) = self.cache.get(secret_id) {
            return Ok(secret);
        }

        let secret = ctx
            .run(self.config.store_timeout, self.store.get(secret_id))
            .await?;
        if self.cache.put_if_newer(secret_id, secret.clone()) {
            return Ok(secret);
        }
        // A rotation or status change landed while the read was in flight
        Ok(self.cache.get(secret_id).unwrap_or(secret))
    }

    // =========================================================================
    // Revocation
    // =========================================================================

    /// Revoke a raw token through the revocation hook.
    ///
    /// The entry is kept until the token's own `exp`, capped at the longest
    /// lifetime this authenticator issues, since `exp` is read unverified.
    /// Without a hook this is a no-op; the token stays valid until it expires
    /// or its secret is rotated.
    pub async fn destroy(&self, ctx: &AuthContext, token: &str) -> Result<(), AuthError> {
        let Some(hook) = &self.revocation else {
            tracing::debug!("No revocation hook configured, destroy is a no-op");
            return Ok(());
        };

        let longest = self.config.access_ttl.max(self.config.refresh_ttl);
        let cap = expiry(self.clock.now(), longest).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let expires_at = self
            .codec
            .peek_expiry(token)
            .map_or(cap, |exp| exp.min(cap));

        ctx.run(self.config.store_timeout, hook.revoke(token, expires_at))
            .await
    }

    /// Disable a secret and replace its cache entry with the disabled record.
    ///
    /// Every token signed with it fails with `SecretDisabled` from now on.
    /// Keeping the disabled revision cached stops an in-flight store read
    /// from writing the enabled copy back.
    pub async fn disable_secret(&self, ctx: &AuthContext, secret_id: &str) -> Result<(), AuthError> {
        let disabled = ctx
            .run(
                self.config.store_timeout,
                self.store.set_status(secret_id, SecretStatus::Disabled),
            )
            .await?;
        self.cache.put_if_newer(secret_id, disabled);
        tracing::info!(secret_id = %secret_id, "Disabled signing secret");
        Ok(())
    }

    /// Check the store answers at all. A missing probe record counts as up.
    pub async fn probe_store(&self, ctx: &AuthContext) -> Result<(), AuthError> {
        match ctx
            .run(self.config.store_timeout, self.store.get("__readiness_probe__"))
            .await
        {
            Ok(_) | Err(AuthError::SecretNotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Which secret purposes back a token kind.
fn accepts(kind: TokenKind, purpose: SecretPurpose) -> bool {
    match kind {
        TokenKind::Access => matches!(
            purpose,
            SecretPurpose::TemporaryLoginKey | SecretPurpose::Service
        ),
        TokenKind::Refresh => purpose == SecretPurpose::TemporaryRefreshKey,
    }
}

fn expiry(now: DateTime<Utc>, lifetime: Duration) -> Result<DateTime<Utc>, AuthError> {
    chrono::Duration::from_std(lifetime)
        .ok()
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| AuthError::SigningFailed("token lifetime out of range".to_string()))
}

fn log_rejection(error: &AuthError, kind: TokenKind) {
    match error {
        AuthError::UnsupportedAlgorithm(alg) => {
            tracing::warn!(alg = %alg, kind = ?kind, "Rejected token with disallowed algorithm");
        }
        AuthError::Store(_) | AuthError::Timeout | AuthError::Cancelled => {
            tracing::error!(error = %error, kind = ?kind, "Token verification could not complete");
        }
        _ => tracing::debug!(error_code = error.error_code(), kind = ?kind, "Rejected token"),
    }
}
