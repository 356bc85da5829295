// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Settings are read from the environment once at startup. Any invalid value
//! aborts startup with a [`ConfigError`]; nothing falls back silently.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `AUTH_ISSUER_URL` | Expected `iss` claim (Keycloak realm URL) | Required |
//! | `AUTH_JWKS_URL` | JWKS endpoint | `{issuer}/protocol/openid-connect/certs` |
//! | `AUTH_AUDIENCE` | Expected audience of user tokens | Required |
//! | `AUTH_SERVICE_AUDIENCE` | Expected audience of service tokens | Unset (service calls rejected) |
//! | `AUTH_ALLOWED_ALGS` | Comma-separated JWS algorithm allow-list | `RS256` |
//! | `AUTH_CLOCK_SKEW_SECONDS` | Leeway for `exp`/`nbf`/`iat` | `60` |
//! | `AUTH_JWKS_CACHE_TTL` | Signing key TTL in seconds | `300` |
//! | `AUTH_JWKS_TIMEOUT_SECONDS` | JWKS HTTP timeout | `30` |
//! | `AUTH_JWKS_MAX_STALE_SECONDS` | How long past TTL a key is served while refreshes fail | `300` |
//! | `AUTH_JWKS_MIN_REFETCH_SECONDS` | Minimum spacing of cache-miss fetches | `10` |
//! | `AUTH_JWKS_ALLOW_HTTP` | Permit a plain-HTTP JWKS URL (development only) | `false` |
//! | `AUTH_TOKEN_TYPE` | Expected `typ` claim | `Bearer` |
//! | `AUTH_ROLE_RESOLUTION` | `priority` or `first_match` | `priority` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use url::Url;

use crate::auth::jwks::{
    DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_STALENESS, DEFAULT_MIN_REFETCH_INTERVAL,
};
use crate::auth::roles::RoleResolution;
use crate::auth::verifier::{default_jwks_url, VerifierConfig, DEFAULT_LEEWAY_SECS};
use crate::telemetry::LogFormat;

/// Expected token issuer, e.g. `https://auth.makrx.org/realms/makrx`.
pub const ISSUER_URL_ENV: &str = "AUTH_ISSUER_URL";

/// JWKS endpoint; derived from the issuer when unset.
pub const JWKS_URL_ENV: &str = "AUTH_JWKS_URL";

pub const AUDIENCE_ENV: &str = "AUTH_AUDIENCE";
pub const SERVICE_AUDIENCE_ENV: &str = "AUTH_SERVICE_AUDIENCE";

/// Comma-separated list, e.g. `RS256,PS256`. Symmetric algorithms are refused.
pub const ALLOWED_ALGS_ENV: &str = "AUTH_ALLOWED_ALGS";

pub const CLOCK_SKEW_ENV: &str = "AUTH_CLOCK_SKEW_SECONDS";
pub const JWKS_CACHE_TTL_ENV: &str = "AUTH_JWKS_CACHE_TTL";
pub const JWKS_TIMEOUT_ENV: &str = "AUTH_JWKS_TIMEOUT_SECONDS";
pub const JWKS_MAX_STALE_ENV: &str = "AUTH_JWKS_MAX_STALE_SECONDS";

/// Unknown key ids inside this window are answered from the cache.
pub const JWKS_MIN_REFETCH_ENV: &str = "AUTH_JWKS_MIN_REFETCH_SECONDS";

/// Only for local Keycloak containers without TLS.
pub const JWKS_ALLOW_HTTP_ENV: &str = "AUTH_JWKS_ALLOW_HTTP";

pub const TOKEN_TYPE_ENV: &str = "AUTH_TOKEN_TYPE";
pub const ROLE_RESOLUTION_ENV: &str = "AUTH_ROLE_RESOLUTION";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Invalid or missing configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Everything the service needs at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    pub verifier: VerifierConfig,
    pub cache_ttl: Duration,
    pub max_stale: Duration,
    pub min_refetch_interval: Duration,
    pub fetch_timeout: Duration,
    pub allow_insecure_jwks: bool,
    pub role_resolution: RoleResolution,
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
}

impl AuthSettings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through `lookup`, which returns `None` for unset
    /// variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let issuer = get(ISSUER_URL_ENV).ok_or(ConfigError::Missing(ISSUER_URL_ENV))?;
        parse_url(ISSUER_URL_ENV, &issuer)?;

        let allow_insecure_jwks = match get(JWKS_ALLOW_HTTP_ENV) {
            Some(value) => parse_bool(JWKS_ALLOW_HTTP_ENV, &value)?,
            None => false,
        };

        let jwks_url = get(JWKS_URL_ENV).unwrap_or_else(|| default_jwks_url(&issuer));
        let parsed = parse_url(JWKS_URL_ENV, &jwks_url)?;
        if parsed.scheme() != "https" && !allow_insecure_jwks {
            return Err(ConfigError::invalid(
                JWKS_URL_ENV,
                &jwks_url,
                format!("must use https unless {JWKS_ALLOW_HTTP_ENV}=true"),
            ));
        }

        let audience = get(AUDIENCE_ENV).ok_or(ConfigError::Missing(AUDIENCE_ENV))?;

        let allowed_algorithms = match get(ALLOWED_ALGS_ENV) {
            Some(value) => parse_algorithms(&value)?,
            None => vec![Algorithm::RS256],
        };

        let leeway = parse_or(&get, CLOCK_SKEW_ENV, DEFAULT_LEEWAY_SECS)?;
        let cache_ttl = parse_or(&get, JWKS_CACHE_TTL_ENV, DEFAULT_CACHE_TTL.as_secs())?;
        let max_stale = parse_or(&get, JWKS_MAX_STALE_ENV, DEFAULT_MAX_STALENESS.as_secs())?;
        let min_refetch =
            parse_or(&get, JWKS_MIN_REFETCH_ENV, DEFAULT_MIN_REFETCH_INTERVAL.as_secs())?;
        let fetch_timeout = parse_or(&get, JWKS_TIMEOUT_ENV, DEFAULT_FETCH_TIMEOUT.as_secs())?;
        if fetch_timeout == 0 {
            return Err(ConfigError::invalid(JWKS_TIMEOUT_ENV, "0", "must be positive"));
        }

        let mut verifier = VerifierConfig::new(issuer, audience)
            .with_jwks_url(jwks_url)
            .with_algorithms(allowed_algorithms)
            .with_leeway(leeway);
        if let Some(service_audience) = get(SERVICE_AUDIENCE_ENV) {
            verifier = verifier.with_service_audience(service_audience);
        }
        if let Some(token_type) = get(TOKEN_TYPE_ENV) {
            verifier.token_type = token_type;
        }

        let role_resolution = match get(ROLE_RESOLUTION_ENV) {
            Some(value) => value
                .parse()
                .map_err(|e| ConfigError::invalid(ROLE_RESOLUTION_ENV, &value, format!("{e}")))?,
            None => RoleResolution::default(),
        };

        let log_format = match get(LOG_FORMAT_ENV) {
            Some(value) => value
                .parse()
                .map_err(|e| ConfigError::invalid(LOG_FORMAT_ENV, &value, format!("{e}")))?,
            None => LogFormat::default(),
        };

        Ok(Self {
            verifier,
            cache_ttl: Duration::from_secs(cache_ttl),
            max_stale: Duration::from_secs(max_stale),
            min_refetch_interval: Duration::from_secs(min_refetch),
            fetch_timeout: Duration::from_secs(fetch_timeout),
            allow_insecure_jwks,
            role_resolution,
            host: get(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, PORT_ENV, 8080)?,
            log_format,
        })
    }

    /// `host:port` to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_url(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::invalid(var, value, e.to_string()))
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::invalid(var, value, "expected true or false")),
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(var, &value, e.to_string())),
        None => Ok(default),
    }
}

/// Parse the allow-list. Only asymmetric signature algorithms are accepted.
fn parse_algorithms(value: &str) -> Result<Vec<Algorithm>, ConfigError> {
    let mut algorithms = Vec::new();
    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let algorithm = Algorithm::from_str(name)
            .map_err(|_| ConfigError::invalid(ALLOWED_ALGS_ENV, name, "unknown algorithm"))?;
        if matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(ConfigError::invalid(
                ALLOWED_ALGS_ENV,
                name,
                "symmetric algorithms cannot be verified with a JWKS",
            ));
        }
        if !algorithms.contains(&algorithm) {
            algorithms.push(algorithm);
        }
    }
    if algorithms.is_empty() {
        return Err(ConfigError::invalid(ALLOWED_ALGS_ENV, value, "allow-list is empty"));
    }
    Ok(algorithms)
}
