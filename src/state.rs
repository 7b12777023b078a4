// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{
    AuthContext, AuthError, Authenticator, AuthenticatorConfig, InMemoryRevocationList,
};
use crate::secrets::InMemorySecretStore;

/// Default upper bound for the auth work done on behalf of one request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub authn: Arc<Authenticator>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(authn: Authenticator) -> Self {
        Self {
            authn: Arc::new(authn),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// State backed by process-local storage only.
    pub fn in_memory(config: AuthenticatorConfig) -> Result<Self, AuthError> {
        let authn = Authenticator::new(Arc::new(InMemorySecretStore::new()), config)?
            .with_revocation(Arc::new(InMemoryRevocationList::new()));
        Ok(Self::new(authn))
    }

    /// Context for auth calls made while serving one request.
    pub fn auth_context(&self) -> AuthContext {
        AuthContext::new().with_timeout(self.request_timeout)
    }
}
