// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Token issuance and verification backed by per-user rotating secrets.
//!
//! ## Auth Flow
//!
//! 1. A caller that has already established who the user is asks for tokens
//!    (`Authenticator::sign`)
//! 2. The user's temporary secrets are rotated and the new tokens carry the
//!    secret ID as `kid`
//! 3. Clients send `Authorization: Bearer <access token>`
//! 4. The server:
//!    - Reads `alg` and `kid` from the header, rejecting non-HMAC algorithms
//!    - Resolves the secret through the LRU cache, then the store
//!    - Checks status, purpose and expiry, then the signature
//!    - Extracts `sub` → canonical `user_id`
//!
//! ## Security
//!
//! - All non-health endpoints except refresh require authentication
//! - Re-issuing tokens for a user invalidates their previous tokens
//! - Disabling a secret rejects every token signed with it

pub mod authenticator;
pub mod cache;
pub mod claims;
pub mod codec;
pub mod context;
pub mod error;
pub mod extractor;
pub mod middleware;
pub mod revocation;

pub use authenticator::{Authenticator, AuthenticatorConfig, IssuedTokens};
pub use cache::SecretCache;
pub use claims::{AuthenticatedUser, TokenClaims, TokenKind};
pub use codec::TokenCodec;
pub use context::{AuthContext, Clock, ManualClock, SystemClock};
pub use error::AuthError;
pub use extractor::Auth;
pub use revocation::{InMemoryRevocationList, RevocationHook};
