// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token endpoints.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::middleware::bearer_token;
use crate::auth::{Auth, AuthContext, IssuedTokens, TokenKind};
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /v1/auth/refresh
#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    /// Refresh token from the last issued pair
    pub refresh_token: String,
}

/// Exchange a refresh token for a new token pair.
///
/// The presented refresh token, and the access token in the `Authorization`
/// header if one is sent, are revoked. Issuing the new pair rotates both of
/// the user's signing keys.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = IssuedTokens),
        (status = 400, description = "Missing refresh token"),
        (status = 401, description = "Refresh token rejected"),
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<IssuedTokens>, ApiError> {
    let refresh_token = request.refresh_token.trim();
    if refresh_token.is_empty() {
        return Err(ApiError::bad_request("refresh_token is required"));
    }

    let ctx = state.auth_context();
    let user_id = state.authn.verify_refresh(&ctx, refresh_token).await?;

    state.authn.destroy(&ctx, refresh_token).await?;
    if let Ok(access_token) = bearer_token(&headers) {
        revoke_presented_access_token(&state, &ctx, access_token, &user_id).await?;
    }

    let tokens = state.authn.sign(&ctx, &user_id).await?;
    tracing::info!(user_id = %user_id, "Refreshed token pair");
    Ok(Json(tokens))
}

/// Revoke an access token sent alongside a refresh, if it is a live token of
/// the same user. Anything else is already unusable and is not recorded.
async fn revoke_presented_access_token(
    state: &AppState,
    ctx: &AuthContext,
    access_token: &str,
    user_id: &str,
) -> Result<(), ApiError> {
    match state
        .authn
        .verify_claims(ctx, access_token, TokenKind::Access)
        .await
    {
        Ok(claims) if claims.sub == user_id => {
            state.authn.destroy(ctx, access_token).await?;
        }
        Ok(claims) => {
            tracing::warn!(user_id = %user_id, other_user_id = %claims.sub, "Refresh presented another user's access token");
        }
        Err(e) if e.is_unauthorized() => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Revoke the access token used for this request.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 204, description = "Token revoked"),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    Auth(user): Auth,
) -> Result<StatusCode, ApiError> {
    state
        .authn
        .destroy(&state.auth_context(), &user.access_token)
        .await?;
    tracing::info!(user_id = %user.user_id, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// Request body for POST /v1/auth/login (dev builds only)
#[cfg(feature = "dev")]
#[derive(Debug, Deserialize, ToSchema)]
pub struct DevLoginRequest {
    pub user_id: String,
}

/// Issue tokens for any user ID without checking credentials.
#[cfg(feature = "dev")]
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "Auth",
    request_body = DevLoginRequest,
    responses(
        (status = 200, description = "New token pair", body = IssuedTokens),
        (status = 400, description = "Missing user ID"),
    )
)]
pub async fn dev_login(
    State(state): State<AppState>,
    Json(request): Json<DevLoginRequest>,
) -> Result<Json<IssuedTokens>, ApiError> {
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(ApiError::bad_request("user_id is required"));
    }
    tracing::warn!(user_id = %user_id, "Issuing tokens through dev login");
    let tokens = state.authn.sign(&state.auth_context(), user_id).await?;
    Ok(Json(tokens))
}
