// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::secrets::StoreError;

/// Authentication error type.
///
/// Every verification failure surfaces as exactly one of these kinds; callers
/// branch on the variant, never on the message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No authorization header present
    #[error("Authorization header is required")]
    MissingAuthHeader,
    /// Invalid authorization header format
    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,
    /// Token is structurally invalid or has no `kid`
    #[error("Token is malformed")]
    MalformedToken,
    /// Header algorithm outside the symmetric HMAC family
    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// `kid` does not resolve to a stored secret
    #[error("Signing secret not found")]
    SecretNotFound,
    /// Resolved secret is disabled
    #[error("Signing secret is disabled")]
    SecretDisabled,
    /// Signature does not verify against the resolved key
    #[error("Token signature is invalid")]
    SignatureInvalid,
    /// Token `exp` passed, `nbf` in the future, or the secret itself expired
    #[error("Token has expired")]
    TokenExpired,
    /// Token issuer does not match this service
    #[error("Token issuer is invalid")]
    InvalidIssuer,
    /// Access token presented where a refresh token is required, or vice versa
    #[error("Token kind is not accepted here")]
    TokenKindMismatch,
    /// Token was revoked through logout or refresh
    #[error("Token has been revoked")]
    TokenRevoked,
    /// Signing a new token failed
    #[error("Failed to sign token: {0}")]
    SigningFailed(String),
    /// Secret store unreachable or erroring
    #[error("Secret store error: {0}")]
    Store(String),
    /// Caller cancelled the request
    #[error("Request was cancelled")]
    Cancelled,
    /// Store call exceeded its deadline
    #[error("Secret store call timed out")]
    Timeout,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            AuthError::SecretNotFound => "secret_not_found",
            AuthError::SecretDisabled => "secret_disabled",
            AuthError::SignatureInvalid => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::TokenKindMismatch => "token_kind_mismatch",
            AuthError::TokenRevoked => "token_revoked",
            AuthError::SigningFailed(_) => "signing_failed",
            AuthError::Store(_) => "store_error",
            AuthError::Cancelled => "cancelled",
            AuthError::Timeout => "timeout",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::MalformedToken
            | AuthError::UnsupportedAlgorithm(_)
            | AuthError::SecretNotFound
            | AuthError::SecretDisabled
            | AuthError::SignatureInvalid
            | AuthError::TokenExpired
            | AuthError::InvalidIssuer
            | AuthError::TokenKindMismatch
            | AuthError::TokenRevoked => StatusCode::UNAUTHORIZED,
            AuthError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AuthError::SigningFailed(_) | AuthError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the failure is the client's credential rather than the server.
    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == StatusCode::UNAUTHORIZED
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => AuthError::SecretNotFound,
            other => AuthError::Store(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
