// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{middleware::auth_middleware, IssuedTokens},
    state::AppState,
};

pub mod auth;
pub mod health;
pub mod users;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/users/me", get(users::get_current_user))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let public = Router::new().route("/auth/refresh", post(auth::refresh));
    #[cfg(feature = "dev")]
    let public = public.route("/auth/login", post(auth::dev_login));

    let v1_routes = public.merge(protected).with_state(state.clone());

    let health_routes = Router::new()
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .nest("/health", health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Registers the `bearer` scheme referenced by protected paths.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::refresh,
        auth::logout,
        users::get_current_user,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            IssuedTokens,
            auth::RefreshRequest,
            users::UserMeResponse,
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Token refresh and logout"),
        (name = "Users", description = "Authenticated user identity"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthenticatorConfig;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState::in_memory(AuthenticatorConfig::default()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_with_token(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = router(test_state());
        // Ensure the router can be converted into a service without panicking.
        let _ = app.into_make_service();
    }

    #[test]
    fn openapi_declares_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer"));
        assert!(doc.paths.paths.contains_key("/v1/auth/refresh"));
    }

    #[tokio::test]
    async fn health_endpoints_report_ok() {
        let app = router(test_state());

        let live = app
            .clone()
            .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(live.status(), StatusCode::OK);

        let ready = app
            .oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready.status(), StatusCode::OK);
        assert_eq!(json_body(ready).await["checks"]["secret_store"], "ok");
    }

    #[tokio::test]
    async fn me_requires_valid_access_token() {
        let state = test_state();
        let tokens = state.authn.sign(&state.auth_context(), "user-42").await.unwrap();
        let app = router(state);

        let response = app
            .clone()
            .oneshot(get_with_token("/v1/users/me", &tokens.access_token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["user_id"], "user-42");

        let response = app
            .oneshot(Request::builder().uri("/v1/users/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error_code"], "missing_auth_header");
    }

    #[tokio::test]
    async fn refresh_rotates_and_revokes_old_pair() {
        let state = test_state();
        let old = state.authn.sign(&state.auth_context(), "user-42").await.unwrap();
        let app = router(state);

        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/auth/refresh",
                serde_json::json!({ "refresh_token": old.refresh_token }),
                Some(&old.access_token),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let new: IssuedTokens = serde_json::from_value(json_body(response).await).unwrap();
        assert_eq!(new.token_type, "Bearer");

        let response = app
            .clone()
            .oneshot(get_with_token("/v1/users/me", &new.access_token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(get_with_token("/v1/users/me", &old.access_token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // The old refresh token cannot be replayed
        let response = app
            .oneshot(post_json(
                "/v1/auth/refresh",
                serde_json::json!({ "refresh_token": old.refresh_token }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_only_revokes_bearer_owned_by_caller() {
        use crate::auth::{Authenticator, InMemoryRevocationList};
        use crate::secrets::InMemorySecretStore;
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        use std::sync::Arc;

        let revocation = Arc::new(InMemoryRevocationList::new());
        let authn = Authenticator::new(
            Arc::new(InMemorySecretStore::new()),
            AuthenticatorConfig::default(),
        )
        .unwrap()
        .with_revocation(revocation.clone());
        let state = AppState::new(authn);
        let ctx = state.auth_context();
        let alice = state.authn.sign(&ctx, "alice").await.unwrap();
        let bob = state.authn.sign(&ctx, "bob").await.unwrap();
        let app = router(state);

        // Unsigned bearer claiming a year-9999 expiry
        let junk = format!("x.{}.y", URL_SAFE_NO_PAD.encode(r#"{"exp":253402300799}"#));
        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/auth/refresh",
                serde_json::json!({ "refresh_token": alice.refresh_token }),
                Some(&junk),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let alice = serde_json::from_value::<IssuedTokens>(json_body(response).await).unwrap();
        // Only the spent refresh token was recorded
        assert_eq!(revocation.len(), 1);

        // Another user's live access token is left alone
        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/auth/refresh",
                serde_json::json!({ "refresh_token": alice.refresh_token }),
                Some(&bob.access_token),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(revocation.len(), 2);

        let response = app
            .oneshot(get_with_token("/v1/users/me", &bob.access_token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn refresh_rejects_access_token_and_empty_body() {
        let state = test_state();
        let tokens = state.authn.sign(&state.auth_context(), "user-42").await.unwrap();
        let app = router(state);

        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/auth/refresh",
                serde_json::json!({ "refresh_token": tokens.access_token }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error_code"], "token_kind_mismatch");

        let response = app
            .oneshot(post_json(
                "/v1/auth/refresh",
                serde_json::json!({ "refresh_token": "  " }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn logout_revokes_access_token() {
        let state = test_state();
        let tokens = state.authn.sign(&state.auth_context(), "user-42").await.unwrap();
        let app = router(state);

        let response = app
            .clone()
            .oneshot(post_json("/v1/auth/logout", serde_json::json!({}), Some(&tokens.access_token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(get_with_token("/v1/users/me", &tokens.access_token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error_code"], "token_revoked");
    }
}
