// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated users.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use super::middleware::authenticate;
use super::{AuthError, AuthenticatedUser};
use crate::state::AppState;

/// Extractor for authenticated users.
///
/// Reuses the user placed in the request extensions by
/// [`auth_middleware`](super::middleware::auth_middleware); otherwise verifies
/// the bearer token itself.
///
/// # Example
///
/// ```rust,ignore
/// async fn logout(
///     Auth(user): Auth,
///     State(state): State<AppState>,
/// ) -> Result<StatusCode, AuthError> {
///     // user.access_token is the raw token presented
/// }
/// ```
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // First check if middleware already set the user
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let user = authenticate(state, &parts.headers).await?;
        parts.extensions.insert(user.clone());
        Ok(Auth(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthenticatorConfig;
    use axum::http::Request;

    fn create_test_state() -> AppState {
        AppState::in_memory(AuthenticatorConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn auth_extractor_requires_auth_header() {
        let state = create_test_state();
        let mut parts = Request::builder()
            .uri("/test")
            .body(())
            .unwrap()
            .into_parts()
            .0;

        // Without auth header, should fail
        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));
    }

    #[tokio::test]
    async fn auth_extractor_succeeds_with_issued_token() {
        let state = create_test_state();
        let tokens = state
            .authn
            .sign(&state.auth_context(), "user_123")
            .await
            .unwrap();
        let mut parts = Request::builder()
            .uri("/test")
            .header("Authorization", format!("Bearer {}", tokens.access_token))
            .body(())
            .unwrap()
            .into_parts()
            .0;

        let Auth(user) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(user.user_id, "user_123");
        assert_eq!(user.access_token, tokens.access_token);
        assert!(parts.extensions.get::<AuthenticatedUser>().is_some());
    }

    #[tokio::test]
    async fn auth_extractor_rejects_forged_token() {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

        let state = create_test_state();
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","kid":"k"}"#);
        let claims = URL_SAFE_NO_PAD.encode(r#"{"sub":"user_123","iss":"authn-server","exp":9999999999,"iat":0}"#);
        let mut parts = Request::builder()
            .uri("/test")
            .header("Authorization", format!("Bearer {header}.{claims}."))
            .body(())
            .unwrap()
            .into_parts()
            .0;

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::UnsupportedAlgorithm(_))));
    }

    #[tokio::test]
    async fn auth_extractor_prefers_extensions() {
        let state = create_test_state();
        // If middleware already set the user, use that
        let mut parts = Request::builder()
            .uri("/test")
            .body(())
            .unwrap()
            .into_parts()
            .0;

        parts
            .extensions
            .insert(AuthenticatedUser::new("user_from_middleware", "tok"));

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert_eq!(result.unwrap().0.user_id, "user_from_middleware");
    }
}
