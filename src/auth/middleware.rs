// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request correlation and ambient context.
//!
//! [`with_request_context`] stacks, outermost first:
//!
//! 1. `SetRequestIdLayer`: generate a UUID `x-request-id` when the client sent
//!    none.
//! 2. `PropagateRequestIdLayer`: echo it on the response.
//! 3. `TraceLayer`: one span per request, tagged with the request id.
//! 4. [`request_context`]: run the rest of the stack inside a fresh
//!    [`RequestContext`] scope.
//! 5. `CatchPanicLayer`: turn a handler panic into the generic 500 envelope,
//!    still inside the context so the envelope carries the request id.

use std::any::Any;

use axum::{
    body::Body,
    extract::Request,
    http::HeaderName,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use super::context::RequestContext;
use crate::error::ApiError;

/// Correlation header.
pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

fn request_id_of(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Run the downstream service inside a request-scoped [`RequestContext`].
///
/// The context is dropped when the response is produced; concurrent requests
/// never observe each other's context.
pub async fn request_context(request: Request, next: Next) -> Response {
    let ctx = match request_id_of(&request) {
        Some(request_id) => RequestContext::with_request_id(request_id),
        None => RequestContext::default(),
    };
    RequestContext::scope(ctx, next.run(request)).await
}

/// 500 envelope for a panicked handler. The payload goes to the log only.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "non-string panic payload".to_string());
    ApiError::internal(format!("handler panicked: {detail}")).into_response()
}

/// Wrap `router` with request-id, tracing and context layers.
pub fn with_request_context<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(
                REQUEST_ID_HEADER.clone(),
                MakeRequestUuid,
            ))
            .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER.clone()))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = request_id_of(request).as_deref().unwrap_or(""),
                    )
                }),
            )
            .layer(middleware::from_fn(request_context))
            .layer(CatchPanicLayer::custom(panic_response)),
    )
}
