// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Keycloak bearer token verification and policy enforcement shared by the
//! MakrX services.
//!
//! ## Auth Flow
//!
//! 1. The frontend authenticates the user with Keycloak
//! 2. The frontend sends `Authorization: Bearer <access token>`
//! 3. The service:
//!    - Resolves the token's signing key from the cached realm JWKS
//!    - Verifies signature, algorithm, issuer, audience, `exp`/`nbf`/`iat`
//!      and `typ`
//!    - Projects the allow-listed claims and maps realm roles to one [`Role`]
//! 4. Handlers gate actions through the [`PermissionMatrix`] and the
//!    [`ScopeGuard`] (makerspace membership and ownership)
//!
//! ## Security
//!
//! - Only allow-listed asymmetric algorithms are accepted (RS256 by default)
//! - JWKS is fetched over HTTPS and cached with a TTL; stale keys are served
//!   while a background refresh runs
//! - Clock skew tolerance is 60 seconds
//! - Denials and admin overrides are written to the `security_events` target

pub mod claims;
pub mod context;
pub mod error;
pub mod events;
pub mod extractor;
pub mod identity;
pub mod jwks;
pub mod middleware;
pub mod permissions;
pub mod roles;
pub mod scope;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;

pub use claims::VerifiedClaims;
pub use context::RequestContext;
pub use error::AuthError;
pub use extractor::{Auth, ServiceAuth};
pub use identity::Identity;
pub use jwks::KeyCache;
pub use permissions::{Action, PermissionMatrix};
pub use roles::{Role, RoleMapper};
pub use scope::ScopeGuard;
pub use verifier::TokenVerifier;
