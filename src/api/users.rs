// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Caller introspection endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::auth::claims::PrincipalKind;
use crate::auth::permissions::Action;
use crate::auth::{Auth, Identity, Role, ServiceAuth};
use crate::state::AppState;

/// Response for GET /v1/users/me
#[derive(Debug, Serialize)]
pub struct UserMeResponse {
    pub user_id: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub makerspace_id: Option<String>,
    /// Actions the role grants, before resource scoping
    pub permissions: Vec<Action>,
}

impl UserMeResponse {
    fn new(user: Identity, permissions: Vec<Action>) -> Self {
        Self {
            user_id: user.id,
            display_name: user.display_name,
            email: user.email,
            role: user.role,
            makerspace_id: user.tenant_id,
            permissions,
        }
    }
}

/// Identity and coarse permissions of the calling user.
pub async fn get_current_user(
    State(state): State<AppState>,
    Auth(user): Auth,
) -> Json<UserMeResponse> {
    let permissions = state.guard.matrix().actions_for(user.role);
    Json(UserMeResponse::new(user, permissions))
}

/// Response for GET /v1/service/whoami
#[derive(Debug, Serialize)]
pub struct ServiceWhoAmIResponse {
    pub principal: PrincipalKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub audience: Vec<String>,
}

/// Identity of the calling service.
pub async fn service_whoami(ServiceAuth(claims): ServiceAuth) -> Json<ServiceWhoAmIResponse> {
    Json(ServiceWhoAmIResponse {
        principal: claims.principal,
        client_id: claims.client_id,
        subject: claims.subject,
        audience: claims.audience,
    })
}
