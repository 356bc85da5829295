// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.
//!
//! Every variant maps to one HTTP status and one machine-readable code.
//! Verification and scope errors are terminal for the request; only
//! [`AuthError::UpstreamUnavailable`] is worth retrying by the caller.

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::error::ErrorEnvelope;

/// Authentication error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// JWKS fetch or parse failed
    #[error("identity provider unavailable: {0}")]
    UpstreamUnavailable(String),
    /// Key-id absent from the identity provider's published set
    #[error("no signing key matches key id {0:?}")]
    KeyNotFound(String),
    /// Structure or signature is invalid
    #[error("token is invalid: {0}")]
    TokenInvalid(String),
    #[error("token has expired")]
    TokenExpired,
    #[error("token is not yet valid")]
    TokenNotYetValid,
    /// `iat` lies beyond the clock-skew window
    #[error("token issued-at is in the future")]
    IssuedInFuture,
    #[error("token issuer is invalid")]
    IssuerMismatch,
    #[error("token audience is invalid")]
    AudienceMismatch,
    /// Declared algorithm is not on the allow-list
    #[error("token algorithm {0:?} is not allowed")]
    AlgorithmNotAllowed(String),
    /// `typ` is not the access-token marker
    #[error("token type is invalid")]
    TokenTypeMismatch,
    #[error("authorization header is required")]
    MissingAuthHeader,
    #[error("invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,
    /// Verified token without a subject
    #[error("token does not identify a subject")]
    IdentityIncomplete,
    #[error("insufficient permissions: {0} required")]
    InsufficientPermissions(String),
    #[error("insufficient scope: {0}")]
    InsufficientScope(String),
    #[error("resource ownership mismatch")]
    OwnershipMismatch,
    #[error("service token required")]
    ServiceTokenRequired,
    #[error("user token required")]
    UserTokenRequired,
    #[error("internal authentication error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::UpstreamUnavailable(_) => "upstream_unavailable",
            AuthError::KeyNotFound(_) => "key_not_found",
            AuthError::TokenInvalid(_) => "token_invalid",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::IssuedInFuture => "invalid_iat",
            AuthError::IssuerMismatch => "invalid_issuer",
            AuthError::AudienceMismatch => "invalid_audience",
            AuthError::AlgorithmNotAllowed(_) => "invalid_algorithm",
            AuthError::TokenTypeMismatch => "invalid_token_type",
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::IdentityIncomplete => "identity_incomplete",
            AuthError::InsufficientPermissions(_) => "insufficient_permissions",
            AuthError::InsufficientScope(_) => "insufficient_scope",
            AuthError::OwnershipMismatch => "ownership_mismatch",
            AuthError::ServiceTokenRequired => "service_token_required",
            AuthError::UserTokenRequired => "user_token_required",
            AuthError::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::KeyNotFound(_)
            | AuthError::TokenInvalid(_)
            | AuthError::TokenExpired
            | AuthError::TokenNotYetValid
            | AuthError::IssuedInFuture
            | AuthError::IssuerMismatch
            | AuthError::AudienceMismatch
            | AuthError::AlgorithmNotAllowed(_)
            | AuthError::TokenTypeMismatch
            | AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::IdentityIncomplete => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientPermissions(_)
            | AuthError::InsufficientScope(_)
            | AuthError::OwnershipMismatch
            | AuthError::ServiceTokenRequired
            | AuthError::UserTokenRequired => StatusCode::FORBIDDEN,
            AuthError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the client.
    ///
    /// Upstream and internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::UpstreamUnavailable(_) => {
                "Authentication service unavailable".to_string()
            }
            AuthError::Internal(_) => "Authentication failed".to_string(),
            AuthError::TokenInvalid(_) => "Token validation failed".to_string(),
            AuthError::KeyNotFound(_) => "Token signing key is not recognized".to_string(),
            other => {
                let mut message = other.to_string();
                if let Some(first) = message.get_mut(0..1) {
                    first.make_ascii_uppercase();
                }
                message
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AuthError::UpstreamUnavailable(_) | AuthError::Internal(_) => {
                tracing::error!(error = %self, code = self.code(), "authentication fault");
            }
            _ => tracing::debug!(error = %self, code = self.code(), "request rejected"),
        }

        let body = Json(ErrorEnvelope::new(status, self.public_message(), self.code()));
        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn envelope_of(response: Response) -> serde_json::Value {
        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body_bytes).unwrap()
    }

    #[tokio::test]
    async fn missing_auth_returns_401_with_challenge() {
        let response = AuthError::MissingAuthHeader.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");

        let body = envelope_of(response).await;
        assert_eq!(body["error"], "Unauthorized");
        assert_eq!(body["code"], "missing_auth_header");
        assert_eq!(body["message"], "Authorization header is required");
        assert!(body["request_id"].is_null());
        assert!(body["ts"].is_string());
    }

    #[tokio::test]
    async fn ownership_mismatch_returns_403() {
        let response = AuthError::OwnershipMismatch.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
        assert_eq!(envelope_of(response).await["code"], "ownership_mismatch");
    }

    #[tokio::test]
    async fn upstream_unavailable_is_503_without_detail() {
        let response =
            AuthError::UpstreamUnavailable("connect to 10.0.0.7:8443 refused".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = envelope_of(response).await;
        assert_eq!(body["code"], "upstream_unavailable");
        assert!(!body["message"].as_str().unwrap().contains("10.0.0.7"));
    }

    #[test]
    fn verification_failures_have_distinct_codes() {
        let errors = [
            AuthError::KeyNotFound("k".into()),
            AuthError::TokenInvalid("x".into()),
            AuthError::TokenExpired,
            AuthError::TokenNotYetValid,
            AuthError::IssuedInFuture,
            AuthError::IssuerMismatch,
            AuthError::AudienceMismatch,
            AuthError::AlgorithmNotAllowed("HS256".into()),
            AuthError::TokenTypeMismatch,
        ];
        let mut codes: Vec<_> = errors.iter().map(AuthError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(errors
            .iter()
            .all(|e| e.status_code() == StatusCode::UNAUTHORIZED));
    }
}
