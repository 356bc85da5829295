// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated callers.
//!
//! Use `Auth` in user-facing handlers and `ServiceAuth` in
//! service-to-service handlers:
//!
//! ```rust,ignore
//! async fn list_items(Auth(user): Auth, State(state): State<AppState>) -> impl IntoResponse {
//!     state.guard.check_permission(&user, Action::ViewInventory)?;
//!     // ...
//! }
//! ```
//!
//! On success the verified subject, roles and groups are merged into the
//! ambient [`RequestContext`] so later log lines and audit events carry them.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use serde_json::json;

use super::claims::VerifiedClaims;
use super::context::{ContextUpdate, RequestContext};
use super::events::{SecurityEventLogger, SecurityEventType};
use super::identity::{self, Identity};
use super::AuthError;
use crate::state::AppState;

/// Extractor for an authenticated end user.
pub struct Auth(pub Identity);

/// Extractor for an authenticated service principal.
pub struct ServiceAuth(pub VerifiedClaims);

/// Token from `Authorization: Bearer <token>`. The scheme is
/// case-insensitive.
fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or(AuthError::InvalidAuthHeader)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

/// Audit rejected credentials. Outages are not the caller's fault and are
/// left to the error log.
fn record_failure(events: &SecurityEventLogger, error: &AuthError) {
    if matches!(
        error,
        AuthError::UpstreamUnavailable(_) | AuthError::Internal(_)
    ) {
        return;
    }
    events.log(
        SecurityEventType::AuthFailure,
        None,
        Some(json!({ "code": error.code() })),
    );
}

async fn authenticate_user(parts: &Parts, state: &AppState) -> Result<Identity, AuthError> {
    let token = bearer_token(parts)?;
    let claims = state.verifier.verify_user(token).await?;
    let identity = identity::extract(&claims, &state.roles)?;
    RequestContext::set(ContextUpdate {
        subject: Some(identity.id.clone()),
        roles: Some(claims.roles),
        groups: Some(claims.groups),
        ..Default::default()
    });
    Ok(identity)
}

async fn authenticate_service(parts: &Parts, state: &AppState) -> Result<VerifiedClaims, AuthError> {
    let token = bearer_token(parts)?;
    state.verifier.verify_service(token).await
}

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // Already resolved by an earlier extractor in this request
        if let Some(identity) = parts.extensions.get::<Identity>().cloned() {
            return Ok(Auth(identity));
        }

        let identity = authenticate_user(parts, state)
            .await
            .inspect_err(|e| record_failure(&state.events, e))?;

        tracing::debug!(user_id = %identity.id, role = %identity.role, "authenticated");
        parts.extensions.insert(identity.clone());
        Ok(Auth(identity))
    }
}

impl FromRequestParts<AppState> for ServiceAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = authenticate_service(parts, state)
            .await
            .inspect_err(|e| record_failure(&state.events, e))?;

        let principal = claims
            .client_id
            .clone()
            .or_else(|| claims.subject.clone());
        RequestContext::set(ContextUpdate {
            subject: principal.clone(),
            roles: Some(claims.roles.clone()),
            ..Default::default()
        });
        tracing::debug!(service = principal.as_deref().unwrap_or(""), "service authenticated");
        Ok(ServiceAuth(claims))
    }
}
