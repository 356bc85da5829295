// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error envelope shared by every non-2xx response, and the outermost
//! boundary for unexpected faults.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::context::RequestContext;

/// JSON body of every 401/403/5xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// HTTP reason phrase ("Unauthorized", "Forbidden", ...).
    pub error: String,
    /// Human-readable description, never internal detail.
    pub message: String,
    /// Machine-readable code.
    pub code: String,
    /// Request correlation ID, when one is in scope.
    pub request_id: Option<String>,
    /// When the error was produced.
    pub ts: DateTime<Utc>,
}

impl ErrorEnvelope {
    /// Build an envelope, pulling the request ID from the ambient context.
    pub fn new(status: StatusCode, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            message: message.into(),
            code: code.into(),
            request_id: RequestContext::current().and_then(|ctx| ctx.request_id),
            ts: Utc::now(),
        }
    }
}

/// Unexpected internal fault.
///
/// The detail is logged; the response only says something went wrong.
#[derive(Debug)]
pub struct ApiError {
    detail: String,
}

impl ApiError {
    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(detail = %self.detail, "internal error");
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let body = ErrorEnvelope::new(status, "An internal error occurred", "internal_error");
        (status, Json(body)).into_response()
    }
}
