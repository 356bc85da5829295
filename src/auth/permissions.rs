// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Static role → action permission matrix.
//!
//! The matrix is the single source of truth for coarse role capabilities.
//! Adding an [`Action`] widens every row of [`MATRIX`]; a row left short is a
//! compile error, so no action can be implicitly allowed.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::roles::Role;

/// Operations gated by the permission matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    // Inventory
    ViewInventory = 0,
    AddEditItems = 1,
    IssueItems = 2,
    ReorderFromStore = 3,
    ViewUsageLogs = 4,
    LinkToBoms = 5,
    DeleteItems = 6,

    // Equipment
    ViewEquipment = 7,
    Reserve = 8,
    CreateEquipment = 9,
    MaintenanceLogs = 10,
    AccessControl = 11,
    DeleteEquipment = 12,
}

impl Action {
    /// Number of actions (columns in the permission matrix).
    pub const COUNT: usize = 13;

    pub const ALL: [Action; Action::COUNT] = [
        Action::ViewInventory,
        Action::AddEditItems,
        Action::IssueItems,
        Action::ReorderFromStore,
        Action::ViewUsageLogs,
        Action::LinkToBoms,
        Action::DeleteItems,
        Action::ViewEquipment,
        Action::Reserve,
        Action::CreateEquipment,
        Action::MaintenanceLogs,
        Action::AccessControl,
        Action::DeleteEquipment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ViewInventory => "view_inventory",
            Action::AddEditItems => "add_edit_items",
            Action::IssueItems => "issue_items",
            Action::ReorderFromStore => "reorder_from_store",
            Action::ViewUsageLogs => "view_usage_logs",
            Action::LinkToBoms => "link_to_boms",
            Action::DeleteItems => "delete_items",
            Action::ViewEquipment => "view_equipment",
            Action::Reserve => "reserve",
            Action::CreateEquipment => "create_equipment",
            Action::MaintenanceLogs => "maintenance_logs",
            Action::AccessControl => "access_control",
            Action::DeleteEquipment => "delete_equipment",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown action: {s}"))
    }
}

const T: bool = true;
const F: bool = false;

/// Rows indexed by [`Role`], columns by [`Action`].
///
/// Column order: view_inventory, add_edit_items, issue_items,
/// reorder_from_store, view_usage_logs, link_to_boms, delete_items,
/// view_equipment, reserve, create_equipment, maintenance_logs,
/// access_control, delete_equipment.
///
/// Tenant and ownership limits ("own makerspace only", "own items only") are
/// not expressed here; they are enforced by the scope guard.
pub const MATRIX: [[bool; Action::COUNT]; Role::COUNT] = [
    // super_admin
    [T, T, T, T, T, T, T, T, T, T, T, T, T],
    // makerspace_admin
    [T, T, T, T, T, T, T, T, T, T, T, T, T],
    // admin
    [T, F, F, F, F, F, F, T, F, F, F, F, F],
    // service_provider
    [T, T, T, T, T, T, T, T, T, T, T, T, T],
    // user
    [T, F, F, F, F, T, F, T, T, F, F, F, F],
];

/// Read-only permission lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionMatrix;

impl PermissionMatrix {
    /// Whether `role` may perform `action`.
    pub fn allowed(&self, role: Role, action: Action) -> bool {
        MATRIX[role as usize][action as usize]
    }

    /// All actions granted to `role`.
    pub fn actions_for(&self, role: Role) -> Vec<Action> {
        Action::ALL
            .into_iter()
            .filter(|a| self.allowed(role, *a))
            .collect()
    }
}
