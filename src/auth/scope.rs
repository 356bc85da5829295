// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Resource-scoped authorization.
//!
//! The permission matrix answers "may this role do X at all". The guard here
//! answers "may this caller do X to *this* resource": makerspace membership,
//! provider ownership and self ownership. Required scopes are conjunctive.
//!
//! Global-override roles skip scope checks but never the matrix. A bypass that
//! actually changed the outcome is recorded as an `admin_override` event; every
//! denial is recorded too.

use std::str::FromStr;

use serde_json::json;

use super::error::AuthError;
use super::events::{SecurityEventLogger, SecurityEventType};
use super::identity::Identity;
use super::permissions::{Action, PermissionMatrix};
use super::roles::Role;

/// A resource that lives in a makerspace and/or has an owner.
///
/// `None` means the resource is not scoped along that axis.
pub trait ScopedResource {
    fn tenant_id(&self) -> Option<&str>;
    fn owner_id(&self) -> Option<&str>;
}

/// Plain descriptor for callers without a domain type at hand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub tenant_id: Option<String>,
    pub owner_id: Option<String>,
}

impl ResourceDescriptor {
    pub fn in_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            owner_id: None,
        }
    }

    pub fn owned_by(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }
}

impl ScopedResource for ResourceDescriptor {
    fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }
}

/// Scope a route or operation declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredScope {
    /// Resource's makerspace must be one the caller belongs to
    Tenant,
    /// Resource must be owned by the caller or the provider it acts for
    Provider,
    /// Resource must be owned by the caller
    SelfOwned,
}

impl RequiredScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredScope::Tenant => "tenant",
            RequiredScope::Provider => "provider",
            RequiredScope::SelfOwned => "self",
        }
    }

    fn event_type(&self) -> SecurityEventType {
        match self {
            RequiredScope::Tenant => SecurityEventType::ScopeDenied,
            RequiredScope::Provider | RequiredScope::SelfOwned => {
                SecurityEventType::OwnershipDenied
            }
        }
    }
}

impl FromStr for RequiredScope {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tenant" | "makerspace" => Ok(RequiredScope::Tenant),
            "provider" => Ok(RequiredScope::Provider),
            "self" => Ok(RequiredScope::SelfOwned),
            other => Err(AuthError::Internal(format!("unknown scope {other:?}"))),
        }
    }
}

/// Evaluate one scope, ignoring any override.
fn evaluate(
    identity: &Identity,
    resource: &dyn ScopedResource,
    scope: RequiredScope,
) -> Result<(), AuthError> {
    match scope {
        RequiredScope::Tenant => match resource.tenant_id() {
            Some(tenant) if !identity.is_tenant_member(tenant) => Err(tenant_mismatch()),
            _ => Ok(()),
        },
        RequiredScope::Provider => match resource.owner_id() {
            Some(owner) if !identity.owns(owner) => Err(AuthError::OwnershipMismatch),
            _ => Ok(()),
        },
        RequiredScope::SelfOwned => match resource.owner_id() {
            Some(owner) if owner != identity.id => Err(AuthError::OwnershipMismatch),
            _ => Ok(()),
        },
    }
}

/// A scope check that did not pass.
struct Failure {
    scope: &'static str,
    event: SecurityEventType,
    error: AuthError,
}

fn tenant_mismatch() -> AuthError {
    AuthError::InsufficientScope("makerspace".to_string())
}

/// Enforces the permission matrix and resource scopes.
#[derive(Clone, Default)]
pub struct ScopeGuard {
    matrix: PermissionMatrix,
    events: SecurityEventLogger,
}

impl ScopeGuard {
    pub fn new(events: SecurityEventLogger) -> Self {
        Self {
            matrix: PermissionMatrix,
            events,
        }
    }

    pub fn matrix(&self) -> &PermissionMatrix {
        &self.matrix
    }

    /// Matrix check. Denials are always logged.
    pub fn check_permission(&self, identity: &Identity, action: Action) -> Result<(), AuthError> {
        if self.matrix.allowed(identity.role, action) {
            return Ok(());
        }
        self.events.log(
            SecurityEventType::PermissionDenied,
            Some(identity.id.as_str()),
            Some(json!({
                "role": identity.role.as_str(),
                "action": action.as_str(),
            })),
        );
        Err(AuthError::InsufficientPermissions(action.as_str().to_string()))
    }

    /// Matrix check for an action given by name. Unknown names are denied
    /// and logged like any other denial.
    pub fn check_permission_by_name(
        &self,
        identity: &Identity,
        action: &str,
    ) -> Result<Action, AuthError> {
        let Ok(parsed) = action.parse::<Action>() else {
            self.events.log(
                SecurityEventType::PermissionDenied,
                Some(identity.id.as_str()),
                Some(json!({
                    "role": identity.role.as_str(),
                    "action": action,
                    "reason": "unknown_action",
                })),
            );
            return Err(AuthError::InsufficientPermissions(action.to_string()));
        };
        self.check_permission(identity, parsed)?;
        Ok(parsed)
    }

    /// Check every scope in `scopes` against `resource`.
    pub fn check_scopes(
        &self,
        identity: &Identity,
        resource: &dyn ScopedResource,
        scopes: &[RequiredScope],
    ) -> Result<(), AuthError> {
        let failed: Vec<Failure> = scopes
            .iter()
            .filter_map(|scope| {
                evaluate(identity, resource, *scope)
                    .err()
                    .map(|error| Failure {
                        scope: scope.as_str(),
                        event: scope.event_type(),
                        error,
                    })
            })
            .collect();
        self.settle(identity, resource, failed)
    }

    /// Item makerspace must be the one named by the caller's tenant claim.
    fn check_home_tenant(
        &self,
        identity: &Identity,
        item: &dyn ScopedResource,
    ) -> Result<(), AuthError> {
        let failed = match item.tenant_id() {
            Some(tenant) if !identity.is_home_tenant(tenant) => vec![Failure {
                scope: RequiredScope::Tenant.as_str(),
                event: SecurityEventType::ScopeDenied,
                error: tenant_mismatch(),
            }],
            _ => Vec::new(),
        };
        self.settle(identity, item, failed)
    }

    /// Apply the global override to failed checks and audit the outcome.
    fn settle(
        &self,
        identity: &Identity,
        resource: &dyn ScopedResource,
        failed: Vec<Failure>,
    ) -> Result<(), AuthError> {
        let Some(first) = failed.first() else {
            return Ok(());
        };

        if identity.role.is_global_override() {
            let bypassed: Vec<&str> = failed.iter().map(|f| f.scope).collect();
            self.events.log(
                SecurityEventType::AdminOverride,
                Some(identity.id.as_str()),
                Some(json!({
                    "role": identity.role.as_str(),
                    "bypassed_scopes": bypassed,
                    "resource_tenant": resource.tenant_id(),
                    "resource_owner": resource.owner_id(),
                })),
            );
            return Ok(());
        }

        self.events.log(
            first.event,
            Some(identity.id.as_str()),
            Some(json!({
                "role": identity.role.as_str(),
                "scope": first.scope,
                "resource_tenant": resource.tenant_id(),
                "resource_owner": resource.owner_id(),
            })),
        );
        Err(first.error.clone())
    }

    /// Matrix check followed by every scope check.
    pub fn authorize(
        &self,
        identity: &Identity,
        action: Action,
        resource: &dyn ScopedResource,
        scopes: &[RequiredScope],
    ) -> Result<(), AuthError> {
        self.check_permission(identity, action)?;
        self.check_scopes(identity, resource, scopes)
    }

    /// Item-level authorization for inventory operations.
    ///
    /// Items belong to the makerspace of the caller's tenant claim; service
    /// providers may only mutate items they own.
    pub fn authorize_item(
        &self,
        identity: &Identity,
        action: Action,
        item: &dyn ScopedResource,
    ) -> Result<(), AuthError> {
        self.check_permission(identity, action)?;
        self.check_home_tenant(identity, item)?;

        let mutating = matches!(action, Action::AddEditItems | Action::DeleteItems);
        if mutating
            && identity.role == Role::ServiceProvider
            && item.owner_id() != Some(identity.id.as_str())
        {
            self.events.log(
                SecurityEventType::OwnershipDenied,
                Some(identity.id.as_str()),
                Some(json!({
                    "role": identity.role.as_str(),
                    "action": action.as_str(),
                    "resource_owner": item.owner_id(),
                })),
            );
            return Err(AuthError::OwnershipMismatch);
        }
        Ok(())
    }

    /// Item checks bound to one caller.
    pub fn checker<'a>(&'a self, identity: &'a Identity) -> PermissionChecker<'a> {
        PermissionChecker {
            guard: self,
            identity,
        }
    }
}

/// Boolean item checks for one caller, for handlers that branch rather than
/// reject.
pub struct PermissionChecker<'a> {
    guard: &'a ScopeGuard,
    identity: &'a Identity,
}

impl PermissionChecker<'_> {
    pub fn can_modify_item(&self, item: &dyn ScopedResource) -> bool {
        self.guard
            .authorize_item(self.identity, Action::AddEditItems, item)
            .is_ok()
    }

    pub fn can_issue_item(&self, item: &dyn ScopedResource) -> bool {
        self.guard
            .authorize_item(self.identity, Action::IssueItems, item)
            .is_ok()
    }

    pub fn can_delete_item(&self, item: &dyn ScopedResource) -> bool {
        self.guard
            .authorize_item(self.identity, Action::DeleteItems, item)
            .is_ok()
    }

    /// Usage logs in general, or of `item` when given.
    pub fn can_view_usage_logs(&self, item: Option<&dyn ScopedResource>) -> bool {
        match item {
            Some(item) => self
                .guard
                .authorize_item(self.identity, Action::ViewUsageLogs, item)
                .is_ok(),
            None => self
                .guard
                .check_permission(self.identity, Action::ViewUsageLogs)
                .is_ok(),
        }
    }
}
