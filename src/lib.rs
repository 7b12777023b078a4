// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authn Server - Dynamic-Secret Token Authentication
//!
//! Issues bearer tokens signed with per-user secrets that rotate on every
//! issuance, and verifies them by resolving the signing secret from the
//! token's `kid` through an in-process LRU cache in front of a persistent
//! secret store.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Token codec, secret cache, authenticator and HTTP guards
//! - `secrets` - Secret records and their stores (in-memory, redb)
//! - `config` - Environment configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod secrets;
pub mod state;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `default_filter`; `format = Some("json")` switches to
/// structured output.
pub fn setup_tracing(default_filter: &str, format: Option<&str>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber.with(fmt::layer().json()).init(),
        _ => subscriber.with(fmt::layer()).init(),
    }
}
