// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;

use authn_server::api::router;
use authn_server::auth::{Authenticator, InMemoryRevocationList};
use authn_server::config::{AuthSettings, DEFAULT_LOG_FILTER, LOG_FORMAT_ENV};
use authn_server::secrets::RedbSecretStore;
use authn_server::setup_tracing;
use authn_server::state::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    let log_format = std::env::var(LOG_FORMAT_ENV).ok();
    setup_tracing(DEFAULT_LOG_FILTER, log_format.as_deref());

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = AuthSettings::from_env()?;

    let db_path = settings.secrets_db_path();
    let store = RedbSecretStore::open(&db_path)?;
    tracing::info!(path = %db_path.display(), "Opened secret store");

    let authn = Authenticator::new(Arc::new(store), settings.authenticator_config())?
        .with_revocation(Arc::new(InMemoryRevocationList::new()));

    tracing::info!(
        issuer = %settings.issuer,
        algorithm = ?settings.algorithm,
        access_ttl_secs = settings.access_ttl.as_secs(),
        cache_capacity = settings.cache_capacity,
        "Authenticator configured"
    );
    #[cfg(feature = "dev")]
    tracing::warn!("Built with the dev feature: POST /v1/auth/login issues tokens without credentials");

    let app = router(AppState::new(authn));

    let addr = settings.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Authn server listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
