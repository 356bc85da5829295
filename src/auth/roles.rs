// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Internal roles and the mapping from identity-provider role names.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Internal roles for authorization.
///
/// ## Role Hierarchy (highest first)
///
/// - `SuperAdmin` - Global override; bypasses tenant and ownership scoping
/// - `MakerspaceAdmin` - Full control of its own makerspace
/// - `Admin` - Read-mostly platform staff
/// - `ServiceProvider` - Manages its own inventory and equipment
/// - `User` - Default member
///
/// The discriminants double as row indices into the permission matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin = 0,
    MakerspaceAdmin = 1,
    Admin = 2,
    ServiceProvider = 3,
    User = 4,
}

impl Role {
    /// Number of roles (rows in the permission matrix).
    pub const COUNT: usize = 5;

    /// Every role, highest privilege first.
    pub const ALL: [Role; Role::COUNT] = [
        Role::SuperAdmin,
        Role::MakerspaceAdmin,
        Role::Admin,
        Role::ServiceProvider,
        Role::User,
    ];

    /// Internal snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::MakerspaceAdmin => "makerspace_admin",
            Role::Admin => "admin",
            Role::ServiceProvider => "service_provider",
            Role::User => "user",
        }
    }

    /// Whether this role bypasses all scope checks.
    pub fn is_global_override(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }

    /// Map an identity-provider (Keycloak realm) role name.
    pub fn from_external(name: &str) -> Option<Role> {
        match name {
            "super-admin" => Some(Role::SuperAdmin),
            "makerspace-admin" => Some(Role::MakerspaceAdmin),
            "admin" => Some(Role::Admin),
            "service-provider" => Some(Role::ServiceProvider),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

impl Default for Role {
    /// Lowest privilege for authenticated users.
    fn default() -> Self {
        Role::User
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    /// Parse an internal snake_case role name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Returned when a role name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

/// How multiple external roles collapse into one internal role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoleResolution {
    /// Highest-privilege recognized role wins, regardless of claim order.
    #[default]
    Priority,
    /// First recognized role in claim order wins.
    FirstMatch,
}

impl FromStr for RoleResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "priority" => Ok(RoleResolution::Priority),
            "first_match" | "first-match" => Ok(RoleResolution::FirstMatch),
            other => Err(format!("unknown role resolution policy: {other}")),
        }
    }
}

/// Collapses the identity provider's role list into a single [`Role`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleMapper {
    resolution: RoleResolution,
}

impl RoleMapper {
    pub fn new(resolution: RoleResolution) -> Self {
        Self { resolution }
    }

    pub fn resolution(&self) -> RoleResolution {
        self.resolution
    }

    /// Map external role names to one internal role.
    ///
    /// Unrecognized names are ignored; falls back to [`Role::User`] when
    /// nothing matches.
    pub fn map_roles<S: AsRef<str>>(&self, external_roles: &[S]) -> Role {
        let mut recognized = external_roles
            .iter()
            .filter_map(|r| Role::from_external(r.as_ref()));

        let resolved = match self.resolution {
            RoleResolution::FirstMatch => recognized.next(),
            // Role ordering is declaration order, highest privilege first.
            RoleResolution::Priority => recognized.min(),
        };

        resolved.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_external_maps_keycloak_names() {
        assert_eq!(Role::from_external("super-admin"), Some(Role::SuperAdmin));
        assert_eq!(Role::from_external("makerspace-admin"), Some(Role::MakerspaceAdmin));
        assert_eq!(Role::from_external("service-provider"), Some(Role::ServiceProvider));
        assert_eq!(Role::from_external("offline_access"), None);
        // Internal spelling is not an external role name
        assert_eq!(Role::from_external("super_admin"), None);
    }

    #[test]
    fn priority_policy_ignores_claim_order() {
        let mapper = RoleMapper::new(RoleResolution::Priority);
        assert_eq!(mapper.map_roles(&["user", "makerspace-admin"]), Role::MakerspaceAdmin);
        assert_eq!(mapper.map_roles(&["makerspace-admin", "user"]), Role::MakerspaceAdmin);
        assert_eq!(
            mapper.map_roles(&["service-provider", "admin", "super-admin"]),
            Role::SuperAdmin
        );
    }

    #[test]
    fn first_match_policy_follows_claim_order() {
        let mapper = RoleMapper::new(RoleResolution::FirstMatch);
        assert_eq!(mapper.map_roles(&["user", "makerspace-admin"]), Role::User);
        assert_eq!(
            mapper.map_roles(&["offline_access", "makerspace-admin", "user"]),
            Role::MakerspaceAdmin
        );
    }

    #[test]
    fn default_policy_is_priority() {
        assert_eq!(RoleMapper::default().resolution(), RoleResolution::Priority);
    }

    #[test]
    fn unknown_roles_default_to_user() {
        let mapper = RoleMapper::default();
        assert_eq!(mapper.map_roles(&["uma_authorization", "offline_access"]), Role::User);
        assert_eq!(mapper.map_roles::<&str>(&[]), Role::User);
    }

    #[test]
    fn internal_names_round_trip_through_display() {
        for role in Role::ALL {
            assert_eq!(role.to_string().parse::<Role>(), Ok(role));
        }
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn only_super_admin_is_global_override() {
        assert!(Role::SuperAdmin.is_global_override());
        assert!(!Role::MakerspaceAdmin.is_global_override());
        assert!(!Role::Admin.is_global_override());
    }

    #[test]
    fn resolution_parses_config_values() {
        assert_eq!("priority".parse::<RoleResolution>(), Ok(RoleResolution::Priority));
        assert_eq!("FIRST_MATCH".parse::<RoleResolution>(), Ok(RoleResolution::FirstMatch));
        assert!("random".parse::<RoleResolution>().is_err());
    }
}
