// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit trail for security-relevant decisions.
//!
//! Denials and global-override bypasses are written as structured events.
//! Logging is best-effort: a failing sink is reported through `tracing` and
//! never surfaces to the guarded operation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::RequestContext;

/// Tracing target carrying security events.
pub const SECURITY_EVENT_TARGET: &str = "security_events";

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    /// A global-override role bypassed a scope check it would have failed
    AdminOverride,
    RoleGrant,
    PermissionDenied,
    ScopeDenied,
    OwnershipDenied,
    AuthFailure,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::AdminOverride => "admin_override",
            SecurityEventType::RoleGrant => "role_grant",
            SecurityEventType::PermissionDenied => "permission_denied",
            SecurityEventType::ScopeDenied => "scope_denied",
            SecurityEventType::OwnershipDenied => "ownership_denied",
            SecurityEventType::AuthFailure => "auth_failure",
        }
    }
}

/// A single audit record. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Unique event ID.
    pub event_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    pub event_type: SecurityEventType,
    /// Subject the event concerns (if known).
    pub user_id: Option<String>,
    /// Correlation ID of the request that produced it.
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl SecurityEvent {
    /// Create a new event, filling subject and request ID from the ambient
    /// [`RequestContext`].
    pub fn new(event_type: SecurityEventType) -> Self {
        let ctx = RequestContext::current().unwrap_or_default();
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            user_id: ctx.subject,
            request_id: ctx.request_id,
            details: None,
        }
    }

    /// Override the subject.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Add details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Failure writing to an audit sink.
#[derive(Debug, thiserror::Error)]
#[error("audit sink failure: {0}")]
pub struct AuditSinkError(pub String);

/// Destination for security events.
pub trait AuditSink: Send + Sync {
    fn write(&self, event: &SecurityEvent) -> Result<(), AuditSinkError>;
}

/// Emits each event as a structured record on [`SECURITY_EVENT_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn write(&self, event: &SecurityEvent) -> Result<(), AuditSinkError> {
        let details = match &event.details {
            Some(details) => serde_json::to_string(details)
                .map_err(|e| AuditSinkError(format!("failed to serialize details: {e}")))?,
            None => String::new(),
        };

        tracing::info!(
            target: "security_events",
            event_id = %event.event_id,
            timestamp = %event.timestamp.to_rfc3339(),
            event_type = event.event_type.as_str(),
            user_id = event.user_id.as_deref().unwrap_or(""),
            request_id = event.request_id.as_deref().unwrap_or(""),
            details = %details,
            "security event"
        );
        Ok(())
    }
}

/// Writes security events to the configured sink.
#[derive(Clone)]
pub struct SecurityEventLogger {
    sink: Arc<dyn AuditSink>,
}

impl Default for SecurityEventLogger {
    fn default() -> Self {
        Self::new(Arc::new(TracingAuditSink))
    }
}

impl SecurityEventLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record an event. Never fails.
    ///
    /// `user_id` falls back to the ambient subject when `None`.
    pub fn log(
        &self,
        event_type: SecurityEventType,
        user_id: Option<&str>,
        details: Option<serde_json::Value>,
    ) {
        let mut event = SecurityEvent::new(event_type);
        if let Some(user_id) = user_id {
            event = event.with_user(user_id);
        }
        if let Some(details) = details {
            event = event.with_details(details);
        }
        self.emit(&event);
    }

    /// Record a pre-built event. Never fails.
    pub fn emit(&self, event: &SecurityEvent) {
        if let Err(e) = self.sink.write(event) {
            tracing::warn!(
                error = %e,
                event_id = %event.event_id,
                event_type = event.event_type.as_str(),
                "dropping security event"
            );
        }
    }
}

/// In-memory sink for assertions in tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemoryAuditSink {
    events: std::sync::Mutex<Vec<SecurityEvent>>,
}

#[cfg(test)]
impl MemoryAuditSink {
    pub(crate) fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl AuditSink for MemoryAuditSink {
    fn write(&self, event: &SecurityEvent) -> Result<(), AuditSinkError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::context::ContextUpdate;
    use serde_json::json;

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn write(&self, _event: &SecurityEvent) -> Result<(), AuditSinkError> {
            Err(AuditSinkError("disk full".into()))
        }
    }

    #[test]
    fn explicit_user_and_details_are_recorded() {
        let sink = Arc::new(MemoryAuditSink::default());
        let logger = SecurityEventLogger::new(sink.clone());

        logger.log(
            SecurityEventType::PermissionDenied,
            Some("user-1"),
            Some(json!({"required": "delete_items", "role": "user"})),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, SecurityEventType::PermissionDenied);
        assert_eq!(events[0].user_id.as_deref(), Some("user-1"));
        assert_eq!(events[0].request_id, None);
        assert_eq!(events[0].details.as_ref().unwrap()["required"], "delete_items");
    }

    #[tokio::test]
    async fn ambient_subject_and_request_id_fill_gaps() {
        let sink = Arc::new(MemoryAuditSink::default());
        let logger = SecurityEventLogger::new(sink.clone());

        RequestContext::scope(RequestContext::with_request_id("req-9"), async {
            RequestContext::set(ContextUpdate {
                subject: Some("user-ambient".into()),
                ..Default::default()
            });
            logger.log(SecurityEventType::AdminOverride, None, None);
        })
        .await;

        let event = &sink.events()[0];
        assert_eq!(event.user_id.as_deref(), Some("user-ambient"));
        assert_eq!(event.request_id.as_deref(), Some("req-9"));
    }

    #[test]
    fn sink_failure_does_not_propagate() {
        let logger = SecurityEventLogger::new(Arc::new(FailingSink));
        logger.log(SecurityEventType::AuthFailure, Some("user-1"), None);
    }

    #[test]
    fn tracing_sink_accepts_events() {
        let event = SecurityEvent::new(SecurityEventType::RoleGrant)
            .with_user("user-1")
            .with_details(json!({"role": "makerspace_admin"}));
        assert!(TracingAuditSink.write(&event).is_ok());
    }

    #[test]
    fn events_serialize_with_snake_case_type() {
        let event = SecurityEvent::new(SecurityEventType::OwnershipDenied);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], "ownership_denied");
        assert!(value.get("details").is_none());
    }
}
