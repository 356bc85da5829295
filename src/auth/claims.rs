// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claim shapes.
//!
//! [`RawClaims`] is the untrusted payload as deserialized after the signature
//! check. It never leaves the verifier; downstream code only sees the
//! allow-listed projection [`VerifiedClaims`].

use serde::{Deserialize, Serialize};

/// Prefix Keycloak gives the user backing a client-credentials grant.
pub const SERVICE_ACCOUNT_PREFIX: &str = "service-account-";

/// `aud` may be a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == expected,
            Audience::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        match self {
            Audience::Single(aud) => vec![aud],
            Audience::Many(auds) => auds,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Token payload before the claim checks ran.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub aud: Option<Audience>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub nbf: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub typ: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub realm_access: Option<RealmAccess>,
    #[serde(default)]
    pub groups: Option<Vec<String>>,
    #[serde(default)]
    pub makerspace_id: Option<String>,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

/// Kind of principal a token was issued to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    User,
    /// Machine client authenticated with client credentials
    Service,
}

/// Claims that passed every verification gate.
///
/// Only allow-listed claims are carried; anything else in the token payload is
/// dropped at the verification boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedClaims {
    /// `sub`; `None` only when the issuer omitted it
    pub subject: Option<String>,
    pub email: Option<String>,
    pub email_verified: bool,
    pub username: Option<String>,
    pub name: Option<String>,
    pub issuer: String,
    pub audience: Vec<String>,
    /// Realm roles in the order the issuer listed them
    pub roles: Vec<String>,
    pub groups: Vec<String>,
    pub token_type: Option<String>,
    pub issued_at: Option<i64>,
    pub not_before: Option<i64>,
    pub expires_at: i64,
    /// Makerspace the subject belongs to
    pub tenant_id: Option<String>,
    pub provider_id: Option<String>,
    pub client_id: Option<String>,
    pub principal: PrincipalKind,
}

impl VerifiedClaims {
    /// Project raw claims after issuer, audience and time checks passed.
    pub(crate) fn project(raw: RawClaims, issuer: String, expires_at: i64) -> Self {
        let principal = principal_of(&raw);
        Self {
            subject: raw.sub.filter(|sub| !sub.is_empty()),
            email: raw.email,
            email_verified: raw.email_verified.unwrap_or(false),
            username: raw.preferred_username,
            name: raw.name,
            issuer,
            audience: raw.aud.map(Audience::into_vec).unwrap_or_default(),
            roles: raw.realm_access.unwrap_or_default().roles,
            groups: raw.groups.unwrap_or_default(),
            token_type: raw.typ,
            issued_at: raw.iat,
            not_before: raw.nbf,
            expires_at,
            tenant_id: raw.makerspace_id,
            provider_id: raw.provider_id,
            client_id: raw.client_id,
            principal,
        }
    }

    pub fn is_service(&self) -> bool {
        self.principal == PrincipalKind::Service
    }
}

fn principal_of(raw: &RawClaims) -> PrincipalKind {
    let service_account = raw
        .preferred_username
        .as_deref()
        .is_some_and(|name| name.starts_with(SERVICE_ACCOUNT_PREFIX));
    if service_account || raw.client_id.is_some() {
        PrincipalKind::Service
    } else {
        PrincipalKind::User
    }
}
