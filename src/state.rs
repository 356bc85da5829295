// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::events::SecurityEventLogger;
use crate::auth::jwks::{HttpJwksFetcher, KeyCache};
use crate::auth::roles::RoleMapper;
use crate::auth::scope::ScopeGuard;
use crate::auth::verifier::TokenVerifier;
use crate::auth::AuthError;
use crate::config::AuthSettings;

/// Shared handler state. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<TokenVerifier>,
    pub roles: RoleMapper,
    pub guard: ScopeGuard,
    pub events: SecurityEventLogger,
}

impl AppState {
    pub fn new(verifier: TokenVerifier, roles: RoleMapper, events: SecurityEventLogger) -> Self {
        Self {
            verifier: Arc::new(verifier),
            roles,
            guard: ScopeGuard::new(events.clone()),
            events,
        }
    }

    /// Wire the production components: HTTPS JWKS fetcher, key cache and
    /// tracing audit sink.
    pub fn from_settings(settings: &AuthSettings) -> Result<Self, AuthError> {
        let fetcher = HttpJwksFetcher::new(settings.fetch_timeout)?
            .allow_insecure_http(settings.allow_insecure_jwks);
        let keys = KeyCache::new(Arc::new(fetcher))
            .with_ttl(settings.cache_ttl)
            .with_max_staleness(settings.max_stale)
            .with_min_refetch_interval(settings.min_refetch_interval);
        let verifier = TokenVerifier::new(settings.verifier.clone(), keys);

        Ok(Self::new(
            verifier,
            RoleMapper::new(settings.role_resolution),
            SecurityEventLogger::default(),
        ))
    }
}
