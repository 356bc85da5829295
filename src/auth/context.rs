// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-request ambient context.
//!
//! The context lives in task-local storage installed by
//! [`RequestContext::scope`]; it is dropped when the scoped future completes
//! and is invisible to every other task. Code running outside a scope sees
//! `None` and writes are ignored.

use std::cell::RefCell;
use std::future::Future;

use serde::Serialize;

tokio::task_local! {
    static REQUEST_CONTEXT: RefCell<RequestContext>;
}

/// Snapshot of request-scoped identity and correlation data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    pub request_id: Option<String>,
    pub subject: Option<String>,
    pub roles: Vec<String>,
    pub groups: Vec<String>,
}

/// Partial update for [`RequestContext::set`]; `None` fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct ContextUpdate {
    pub request_id: Option<String>,
    pub subject: Option<String>,
    pub roles: Option<Vec<String>>,
    pub groups: Option<Vec<String>>,
}

impl RequestContext {
    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            ..Self::default()
        }
    }

    /// Run `fut` with `ctx` as its ambient request context.
    pub fn scope<F: Future>(ctx: RequestContext, fut: F) -> impl Future<Output = F::Output> {
        REQUEST_CONTEXT.scope(RefCell::new(ctx), fut)
    }

    /// Snapshot of the current context, `None` outside a scope.
    pub fn current() -> Option<RequestContext> {
        REQUEST_CONTEXT.try_with(|ctx| ctx.borrow().clone()).ok()
    }

    /// Merge non-`None` fields into the current context.
    ///
    /// Returns `false` when called outside a scope.
    pub fn set(update: ContextUpdate) -> bool {
        REQUEST_CONTEXT
            .try_with(|ctx| ctx.borrow_mut().merge(update))
            .is_ok()
    }

    fn merge(&mut self, update: ContextUpdate) {
        if let Some(request_id) = update.request_id {
            self.request_id = Some(request_id);
        }
        if let Some(subject) = update.subject {
            self.subject = Some(subject);
        }
        if let Some(roles) = update.roles {
            self.roles = roles;
        }
        if let Some(groups) = update.groups {
            self.groups = groups;
        }
    }
}
