// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! MakrX Auth - Token Verification and Policy Enforcement
//!
//! This crate provides the authentication and authorization layer shared by
//! the MakrX makerspace and store services, with Keycloak as the identity
//! provider.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - JWKS cache, token verification, roles, permissions and scopes
//! - `config` - Environment-sourced settings
//! - `telemetry` - Tracing subscriber setup

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod state;
pub mod telemetry;
