// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Normalized identity of the caller.

use serde::Serialize;

use super::claims::{PrincipalKind, VerifiedClaims};
use super::error::AuthError;
use super::roles::{Role, RoleMapper};

/// Group prefix marking makerspace (tenant) membership.
pub const TENANT_GROUP_PREFIX: &str = "makerspace:";

/// The authenticated caller as seen by business logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Canonical subject id (`sub`)
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    /// Single normalized role
    pub role: Role,
    pub groups: Vec<String>,
    /// Makerspace the caller belongs to
    pub tenant_id: Option<String>,
    pub provider_id: Option<String>,
    pub principal: PrincipalKind,
}

impl Identity {
    /// Whether the caller holds the `makerspace:{tenant_id}` group.
    pub fn is_tenant_member(&self, tenant_id: &str) -> bool {
        self.groups.iter().any(|group| {
            group
                .strip_prefix(TENANT_GROUP_PREFIX)
                .is_some_and(|id| id == tenant_id)
        })
    }

    /// Whether `tenant_id` is the makerspace named by the caller's tenant
    /// claim. Only item-level checks use this.
    pub fn is_home_tenant(&self, tenant_id: &str) -> bool {
        self.tenant_id.as_deref() == Some(tenant_id)
    }

    /// Whether `owner_id` is the caller or the provider it acts for.
    pub fn owns(&self, owner_id: &str) -> bool {
        self.id == owner_id || self.provider_id.as_deref() == Some(owner_id)
    }
}

/// Build the [`Identity`] for verified claims.
///
/// Fails with [`AuthError::IdentityIncomplete`] when the token names no
/// subject.
pub fn extract(claims: &VerifiedClaims, roles: &RoleMapper) -> Result<Identity, AuthError> {
    let id = claims
        .subject
        .clone()
        .ok_or(AuthError::IdentityIncomplete)?;

    let display_name = claims
        .name
        .clone()
        .or_else(|| claims.username.clone())
        .or_else(|| claims.email.clone())
        .unwrap_or_else(|| id.clone());

    Ok(Identity {
        role: roles.map_roles(&claims.roles),
        display_name,
        email: claims.email.clone(),
        groups: claims.groups.clone(),
        tenant_id: claims.tenant_id.clone(),
        provider_id: claims.provider_id.clone(),
        principal: claims.principal,
        id,
    })
}
