// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Policy decision endpoint.
//!
//! Lets a business service ask whether the calling user may perform an action
//! on a resource without linking this crate. Unknown action or scope names
//! are denied and audited like any other denial.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::json;

use crate::auth::events::SecurityEventType;
use crate::auth::scope::{RequiredScope, ResourceDescriptor};
use crate::auth::{Auth, AuthError};
use crate::state::AppState;

/// Body of POST /v1/authorize
#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub action: String,
    #[serde(default)]
    pub makerspace_id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// 204 when allowed, 403 envelope otherwise.
pub async fn authorize(
    State(state): State<AppState>,
    Auth(user): Auth,
    Json(request): Json<AuthorizeRequest>,
) -> Result<StatusCode, AuthError> {
    state.guard.check_permission_by_name(&user, &request.action)?;

    let scopes = request
        .scopes
        .iter()
        .map(|name| {
            name.parse::<RequiredScope>().map_err(|_| {
                state.events.log(
                    SecurityEventType::ScopeDenied,
                    Some(user.id.as_str()),
                    Some(json!({
                        "role": user.role.as_str(),
                        "scope": name,
                        "reason": "unknown_scope",
                    })),
                );
                AuthError::InsufficientScope(name.clone())
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let resource = ResourceDescriptor {
        tenant_id: request.makerspace_id,
        owner_id: request.owner_id,
    };

    state.guard.check_scopes(&user, &resource, &scopes)?;
    Ok(StatusCode::NO_CONTENT)
}
