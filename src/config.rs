// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! at startup and validated once; a bad value stops the server from starting.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding the secret database | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `AUTH_ISSUER` | `iss` claim written and expected | `authn-server` |
//! | `AUTH_SIGNING_ALG` | `HS256`, `HS384` or `HS512` | `HS512` |
//! | `ACCESS_TOKEN_TTL_SECS` | Access token lifetime | `7200` |
//! | `REFRESH_TOKEN_TTL_SECS` | Refresh token lifetime | `604800` |
//! | `SECRET_CACHE_CAPACITY` | Max secrets held in the LRU cache | `4096` |
//! | `SECRET_CACHE_TTL_SECS` | Max age of a cached secret, `0` = until evicted | `60` |
//! | `SECRET_STORE_TIMEOUT_MS` | Per-call secret store timeout | `2000` |
//! | `TOKEN_LEEWAY_SECS` | Clock skew tolerated on expiry | `0` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use thiserror::Error;

use crate::auth::cache::DEFAULT_CAPACITY;
use crate::auth::codec::parse_algorithm;
use crate::auth::AuthenticatorConfig;

/// Environment variable name for the data directory path.
///
/// The secret database is created at `$DATA_DIR/secrets.redb`.
///
/// # Default
/// `/data`
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = "/data";

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

pub const AUTH_ISSUER_ENV: &str = "AUTH_ISSUER";
pub const AUTH_SIGNING_ALG_ENV: &str = "AUTH_SIGNING_ALG";
pub const ACCESS_TOKEN_TTL_ENV: &str = "ACCESS_TOKEN_TTL_SECS";
pub const REFRESH_TOKEN_TTL_ENV: &str = "REFRESH_TOKEN_TTL_SECS";
pub const SECRET_CACHE_CAPACITY_ENV: &str = "SECRET_CACHE_CAPACITY";
pub const SECRET_CACHE_TTL_ENV: &str = "SECRET_CACHE_TTL_SECS";
pub const SECRET_STORE_TIMEOUT_ENV: &str = "SECRET_STORE_TIMEOUT_MS";
pub const TOKEN_LEEWAY_ENV: &str = "TOKEN_LEEWAY_SECS";

/// Logging format switch: `json` for structured output, anything else pretty.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Secret database file name inside `DATA_DIR`.
pub const SECRETS_DB_FILE: &str = "secrets.redb";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Validated server settings.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub issuer: String,
    pub algorithm: Algorithm,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub cache_capacity: usize,
    pub cache_ttl: Option<Duration>,
    pub store_timeout: Duration,
    pub leeway_secs: u64,
}

impl AuthSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let algorithm = match var(AUTH_SIGNING_ALG_ENV) {
            Some(name) => parse_algorithm(name.trim()).map_err(|_| ConfigError::Invalid {
                name: AUTH_SIGNING_ALG_ENV,
                value: name.clone(),
                reason: "expected HS256, HS384 or HS512".to_string(),
            })?,
            None => Algorithm::HS512,
        };

        let access_ttl: u64 = parse(var(ACCESS_TOKEN_TTL_ENV), ACCESS_TOKEN_TTL_ENV, 2 * 60 * 60)?;
        let refresh_ttl: u64 = parse(var(REFRESH_TOKEN_TTL_ENV), REFRESH_TOKEN_TTL_ENV, 7 * 24 * 60 * 60)?;
        if access_ttl == 0 {
            return Err(invalid(ACCESS_TOKEN_TTL_ENV, "0", "must be positive"));
        }
        if refresh_ttl < access_ttl {
            return Err(invalid(
                REFRESH_TOKEN_TTL_ENV,
                &refresh_ttl.to_string(),
                "must not be shorter than the access token lifetime",
            ));
        }

        let cache_ttl: u64 = parse(var(SECRET_CACHE_TTL_ENV), SECRET_CACHE_TTL_ENV, 60)?;
        let store_timeout: u64 = parse(var(SECRET_STORE_TIMEOUT_ENV), SECRET_STORE_TIMEOUT_ENV, 2000)?;

        Ok(Self {
            host: var(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse(var(PORT_ENV), PORT_ENV, DEFAULT_PORT)?,
            data_dir: PathBuf::from(var(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            issuer: var(AUTH_ISSUER_ENV).unwrap_or_else(|| "authn-server".to_string()),
            algorithm,
            access_ttl: Duration::from_secs(access_ttl),
            refresh_ttl: Duration::from_secs(refresh_ttl),
            cache_capacity: parse(var(SECRET_CACHE_CAPACITY_ENV), SECRET_CACHE_CAPACITY_ENV, DEFAULT_CAPACITY)?,
            cache_ttl: (cache_ttl > 0).then(|| Duration::from_secs(cache_ttl)),
            store_timeout: Duration::from_millis(store_timeout),
            leeway_secs: parse(var(TOKEN_LEEWAY_ENV), TOKEN_LEEWAY_ENV, 0)?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn secrets_db_path(&self) -> PathBuf {
        self.data_dir.join(SECRETS_DB_FILE)
    }

    pub fn authenticator_config(&self) -> AuthenticatorConfig {
        AuthenticatorConfig {
            issuer: self.issuer.clone(),
            algorithm: self.algorithm,
            access_ttl: self.access_ttl,
            refresh_ttl: self.refresh_ttl,
            cache_capacity: self.cache_capacity,
            cache_ttl: self.cache_ttl,
            store_timeout: Some(self.store_timeout),
            leeway_secs: self.leeway_secs,
        }
    }
}

fn parse<T>(value: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(name, &raw, &e.to_string())),
        None => Ok(default),
    }
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<AuthSettings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AuthSettings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.bind_address(), "0.0.0.0:8080");
        assert_eq!(s.secrets_db_path(), PathBuf::from("/data/secrets.redb"));
        assert_eq!(s.algorithm, Algorithm::HS512);
        assert_eq!(s.access_ttl, Duration::from_secs(7200));
        assert_eq!(s.refresh_ttl, Duration::from_secs(604_800));
        assert_eq!(s.cache_capacity, 4096);
        assert_eq!(s.cache_ttl, Some(Duration::from_secs(60)));
        assert_eq!(s.store_timeout, Duration::from_millis(2000));
        assert_eq!(s.leeway_secs, 0);
    }

    #[test]
    fn overrides_are_parsed() {
        let s = settings(&[
            ("PORT", "9000"),
            ("AUTH_ISSUER", "auth.example"),
            ("AUTH_SIGNING_ALG", "HS256"),
            ("ACCESS_TOKEN_TTL_SECS", "60"),
            ("SECRET_CACHE_TTL_SECS", "0"),
            ("TOKEN_LEEWAY_SECS", "5"),
        ])
        .unwrap();

        assert_eq!(s.port, 9000);
        assert_eq!(s.algorithm, Algorithm::HS256);
        assert_eq!(s.cache_ttl, None);

        let config = s.authenticator_config();
        assert_eq!(config.issuer, "auth.example");
        assert_eq!(config.access_ttl, Duration::from_secs(60));
        assert_eq!(config.leeway_secs, 5);
    }

    #[test]
    fn asymmetric_algorithm_rejected() {
        let err = settings(&[("AUTH_SIGNING_ALG", "RS256")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: AUTH_SIGNING_ALG_ENV, .. }));
    }

    #[test]
    fn garbage_numbers_rejected() {
        assert!(settings(&[("PORT", "eighty")]).is_err());
        assert!(settings(&[("SECRET_CACHE_CAPACITY", "-1")]).is_err());
        assert!(settings(&[("ACCESS_TOKEN_TTL_SECS", "0")]).is_err());
        assert!(settings(&[("REFRESH_TOKEN_TTL_SECS", "10")]).is_err());
    }
}
