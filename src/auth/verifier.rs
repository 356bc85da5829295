// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token verification.
//!
//! Gates run in a fixed order and each one is terminal:
//!
//! 1. Header parse; declared `alg` must be on the allow-list.
//! 2. Signing key lookup by `kid` through the [`KeyCache`].
//! 3. Signature check with exactly that key and the declared algorithm.
//! 4. `iss` exact match.
//! 5. `aud` (string or list) contains the expected audience.
//! 6. `exp` / `nbf` / `iat` against the clock-skew leeway.
//! 7. `typ`, when present, is the access-token marker.
//!
//! Only then are the allow-listed claims projected into [`VerifiedClaims`].

use std::collections::HashSet;
use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use serde::Deserialize;

use super::claims::{RawClaims, VerifiedClaims};
use super::error::AuthError;
use super::jwks::KeyCache;

/// Default clock-skew tolerance in seconds.
pub const DEFAULT_LEEWAY_SECS: u64 = 60;

/// `typ` of Keycloak access tokens.
pub const ACCESS_TOKEN_TYPE: &str = "Bearer";

/// What a token must match to be accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    pub issuer: String,
    pub jwks_url: String,
    /// Audience of user-facing endpoints
    pub audience: String,
    /// Audience of service-to-service endpoints; `None` rejects service calls
    pub service_audience: Option<String>,
    pub allowed_algorithms: Vec<Algorithm>,
    pub leeway: u64,
    pub token_type: String,
}

impl VerifierConfig {
    /// Config with defaults: Keycloak JWKS path under the issuer, RS256 only,
    /// 60s leeway.
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        let issuer = issuer.into();
        let jwks_url = default_jwks_url(&issuer);
        Self {
            issuer,
            jwks_url,
            audience: audience.into(),
            service_audience: None,
            allowed_algorithms: vec![Algorithm::RS256],
            leeway: DEFAULT_LEEWAY_SECS,
            token_type: ACCESS_TOKEN_TYPE.to_string(),
        }
    }

    pub fn with_jwks_url(mut self, jwks_url: impl Into<String>) -> Self {
        self.jwks_url = jwks_url.into();
        self
    }

    pub fn with_service_audience(mut self, audience: impl Into<String>) -> Self {
        self.service_audience = Some(audience.into());
        self
    }

    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.allowed_algorithms = algorithms;
        self
    }

    pub fn with_leeway(mut self, leeway: u64) -> Self {
        self.leeway = leeway;
        self
    }
}

/// Keycloak's certs endpoint for `issuer`.
pub fn default_jwks_url(issuer: &str) -> String {
    format!(
        "{}/protocol/openid-connect/certs",
        issuer.trim_end_matches('/')
    )
}

/// The part of the JOSE header read before the signature is checked.
///
/// `alg` is kept as a string so that values the JWT library cannot even
/// represent (`none`) are still reported as disallowed.
#[derive(Debug, Deserialize)]
struct UntrustedHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

fn parse_header(raw: &str) -> Result<UntrustedHeader, AuthError> {
    let mut segments = raw.split('.');
    let (Some(header), Some(_), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::TokenInvalid("not a compact JWS".to_string()));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| AuthError::TokenInvalid("header is not base64url".to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::TokenInvalid(format!("malformed header: {e}")))
}

/// Verifies bearer tokens against the identity provider's published keys.
pub struct TokenVerifier {
    config: VerifierConfig,
    keys: KeyCache,
}

impl TokenVerifier {
    pub fn new(config: VerifierConfig, keys: KeyCache) -> Self {
        Self { config, keys }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeyCache {
        &self.keys
    }

    /// Verify a token meant for a user-facing endpoint.
    ///
    /// Service principals are refused even when their audience matches.
    pub async fn verify_user(&self, raw: &str) -> Result<VerifiedClaims, AuthError> {
        let claims = self.verify(raw, &self.config.audience).await?;
        if claims.is_service() {
            return Err(AuthError::UserTokenRequired);
        }
        Ok(claims)
    }

    /// Verify a service-to-service token.
    pub async fn verify_service(&self, raw: &str) -> Result<VerifiedClaims, AuthError> {
        let audience = self
            .config
            .service_audience
            .as_deref()
            .ok_or(AuthError::ServiceTokenRequired)?;
        let claims = self.verify(raw, audience).await?;
        if !claims.is_service() {
            return Err(AuthError::ServiceTokenRequired);
        }
        Ok(claims)
    }

    /// Verify `raw` for `audience` at the current time.
    pub async fn verify(&self, raw: &str, audience: &str) -> Result<VerifiedClaims, AuthError> {
        self.verify_at(raw, audience, chrono::Utc::now().timestamp())
            .await
    }

    /// Verify `raw` for `audience` as of `now` (epoch seconds).
    pub async fn verify_at(
        &self,
        raw: &str,
        audience: &str,
        now: i64,
    ) -> Result<VerifiedClaims, AuthError> {
        let header = parse_header(raw)?;
        let algorithm = Algorithm::from_str(&header.alg)
            .ok()
            .filter(|alg| self.config.allowed_algorithms.contains(alg))
            .ok_or_else(|| AuthError::AlgorithmNotAllowed(header.alg.clone()))?;

        let key_id = header
            .kid
            .ok_or_else(|| AuthError::TokenInvalid("missing key id".to_string()))?;
        let key = self.keys.get_key(&key_id, &self.config.jwks_url).await?;

        if key.algorithm.is_some_and(|bound| bound != algorithm) {
            return Err(AuthError::TokenInvalid(format!(
                "key {key_id} is not bound to {algorithm:?}"
            )));
        }

        let raw_claims = decode::<RawClaims>(raw, key.decoding_key(), &signature_only(algorithm))
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => AuthError::TokenInvalid("bad signature".to_string()),
                _ => AuthError::TokenInvalid(e.to_string()),
            })?
            .claims;

        let issuer = match raw_claims.iss.as_deref() {
            Some(iss) if iss == self.config.issuer => iss.to_string(),
            _ => return Err(AuthError::IssuerMismatch),
        };

        if !raw_claims
            .aud
            .as_ref()
            .is_some_and(|aud| aud.contains(audience))
        {
            return Err(AuthError::AudienceMismatch);
        }

        let expires_at = self.check_times(&raw_claims, now)?;

        if let Some(typ) = raw_claims.typ.as_deref() {
            if typ != self.config.token_type {
                return Err(AuthError::TokenTypeMismatch);
            }
        }

        tracing::trace!(kid = %key_id, alg = ?algorithm, "token verified");
        Ok(VerifiedClaims::project(raw_claims, issuer, expires_at))
    }

    /// Apply the leeway independently to `exp`, `nbf` and `iat`.
    fn check_times(&self, claims: &RawClaims, now: i64) -> Result<i64, AuthError> {
        let leeway = i64::try_from(self.config.leeway).unwrap_or(i64::MAX);

        let exp = claims
            .exp
            .ok_or_else(|| AuthError::TokenInvalid("missing exp".to_string()))?;
        if exp < now.saturating_sub(leeway) {
            return Err(AuthError::TokenExpired);
        }
        if claims.nbf.is_some_and(|nbf| nbf > now.saturating_add(leeway)) {
            return Err(AuthError::TokenNotYetValid);
        }
        if claims.iat.is_some_and(|iat| iat > now.saturating_add(leeway)) {
            return Err(AuthError::IssuedInFuture);
        }
        Ok(exp)
    }
}

/// Validation that checks the signature and nothing else; claim checks are
/// done by [`TokenVerifier`] with integer-second semantics.
fn signature_only(algorithm: Algorithm) -> Validation {
    let mut validation = Validation::new(algorithm);
    validation.algorithms = vec![algorithm];
    validation.required_spec_claims = HashSet::new();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.leeway = 0;
    validation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::PrincipalKind;
    use crate::auth::testing::*;
    use serde_json::json;
    use std::sync::Arc;

    fn verifier_with(fetcher: StubFetcher, config: VerifierConfig) -> TokenVerifier {
        let keys = KeyCache::new(Arc::new(fetcher));
        TokenVerifier::new(config.with_jwks_url(JWKS_URL), keys)
    }

    fn verifier() -> TokenVerifier {
        verifier_with(
            StubFetcher::always(jwks_of(vec![trusted_jwk(TRUSTED_KID)])),
            VerifierConfig::new(ISSUER, AUDIENCE).with_service_audience(SERVICE_AUDIENCE),
        )
    }

    async fn check(claims: serde_json::Value, now: i64) -> Result<VerifiedClaims, AuthError> {
        verifier().verify_at(&sign(&claims), AUDIENCE, now).await
    }

    #[tokio::test]
    async fn valid_token_verifies() {
        let now = 1_700_000_000;
        let claims = check(user_claims(now), now).await.unwrap();

        assert_eq!(claims.subject.as_deref(), Some("user-123"));
        assert_eq!(claims.issuer, ISSUER);
        assert_eq!(claims.audience, vec![AUDIENCE.to_string()]);
        assert_eq!(claims.roles, vec!["user".to_string()]);
        assert_eq!(claims.tenant_id.as_deref(), Some("ms-1"));
        assert_eq!(claims.expires_at, now + 300);
        assert!(claims.email_verified);
        assert_eq!(claims.principal, PrincipalKind::User);
    }

    #[tokio::test]
    async fn verify_uses_the_wall_clock() {
        let token = sign(&user_claims(now()));
        assert!(verifier().verify(&token, AUDIENCE).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_signing_key_is_key_not_found() {
        let now = 1_700_000_000;
        let token = sign_rogue(&user_claims(now), "attacker-key");
        let err = verifier().verify_at(&token, AUDIENCE, now).await.unwrap_err();
        assert_eq!(err, AuthError::KeyNotFound("attacker-key".into()));
    }

    #[tokio::test]
    async fn forged_signature_under_trusted_kid_is_invalid() {
        let now = 1_700_000_000;
        let token = sign_rogue(&user_claims(now), TRUSTED_KID);
        let err = verifier().verify_at(&token, AUDIENCE, now).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid(_)));
    }

    #[tokio::test]
    async fn issuer_must_match_exactly() {
        let now = 1_700_000_000;
        for issuer in [
            "https://auth.makrx.test/realms/makrX",
            "https://auth.makrx.test/realms/makrx/",
            "http://auth.makrx.test/realms/makrx",
        ] {
            let mut claims = user_claims(now);
            claims["iss"] = json!(issuer);
            assert_eq!(check(claims, now).await.unwrap_err(), AuthError::IssuerMismatch);
        }

        let mut claims = user_claims(now);
        claims.as_object_mut().unwrap().remove("iss");
        assert_eq!(check(claims, now).await.unwrap_err(), AuthError::IssuerMismatch);
    }

    #[tokio::test]
    async fn audience_may_be_a_list() {
        let now = 1_700_000_000;
        let mut claims = user_claims(now);
        claims["aud"] = json!(["account", AUDIENCE]);
        assert!(check(claims, now).await.is_ok());

        let mut claims = user_claims(now);
        claims["aud"] = json!(["account", "makrx-store"]);
        assert_eq!(check(claims, now).await.unwrap_err(), AuthError::AudienceMismatch);

        let mut claims = user_claims(now);
        claims["aud"] = json!("makrx-store");
        assert_eq!(check(claims, now).await.unwrap_err(), AuthError::AudienceMismatch);
    }

    #[tokio::test]
    async fn algorithm_outside_allow_list_is_rejected_before_key_lookup() {
        let now = 1_700_000_000;
        let fetcher = Arc::new(StubFetcher::always(jwks_of(vec![trusted_jwk(TRUSTED_KID)])));
        let verifier = TokenVerifier::new(
            VerifierConfig::new(ISSUER, AUDIENCE).with_jwks_url(JWKS_URL),
            KeyCache::new(fetcher.clone()),
        );

        // Valid RSA signature, but RS384 is not allowed
        let token = sign_rsa_alg(&user_claims(now), Algorithm::RS384);
        let err = verifier.verify_at(&token, AUDIENCE, now).await.unwrap_err();
        assert_eq!(err, AuthError::AlgorithmNotAllowed("RS384".into()));

        let token = sign_hs256_confusion(&user_claims(now));
        let err = verifier.verify_at(&token, AUDIENCE, now).await.unwrap_err();
        assert_eq!(err, AuthError::AlgorithmNotAllowed("HS256".into()));

        let token = unsigned_none(&user_claims(now));
        let err = verifier.verify_at(&token, AUDIENCE, now).await.unwrap_err();
        assert_eq!(err, AuthError::AlgorithmNotAllowed("none".into()));

        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn allowed_algorithm_must_match_key_binding() {
        let now = 1_700_000_000;
        let verifier = verifier_with(
            StubFetcher::always(jwks_of(vec![trusted_jwk(TRUSTED_KID)])),
            VerifierConfig::new(ISSUER, AUDIENCE)
                .with_algorithms(vec![Algorithm::RS256, Algorithm::RS384]),
        );

        // The JWK declares RS256
        let token = sign_rsa_alg(&user_claims(now), Algorithm::RS384);
        let err = verifier.verify_at(&token, AUDIENCE, now).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid(_)));
    }

    #[tokio::test]
    async fn expiry_boundary_is_at_leeway() {
        let now = 1_700_000_000;

        let mut claims = user_claims(now - 600);
        claims["exp"] = json!(now - 60 + 1);
        assert!(check(claims, now).await.is_ok());

        let mut claims = user_claims(now - 600);
        claims["exp"] = json!(now - 60);
        assert!(check(claims, now).await.is_ok());

        let mut claims = user_claims(now - 600);
        claims["exp"] = json!(now - 60 - 1);
        assert_eq!(check(claims, now).await.unwrap_err(), AuthError::TokenExpired);
    }

    #[tokio::test]
    async fn missing_exp_is_invalid() {
        let now = 1_700_000_000;
        let mut claims = user_claims(now);
        claims.as_object_mut().unwrap().remove("exp");
        assert!(matches!(
            check(claims, now).await.unwrap_err(),
            AuthError::TokenInvalid(_)
        ));
    }

    #[tokio::test]
    async fn not_before_beyond_leeway_is_rejected() {
        let now = 1_700_000_000;

        let mut claims = user_claims(now);
        claims["nbf"] = json!(now + 60);
        assert!(check(claims, now).await.is_ok());

        let mut claims = user_claims(now);
        claims["nbf"] = json!(now + 61);
        assert_eq!(
            check(claims, now).await.unwrap_err(),
            AuthError::TokenNotYetValid
        );
    }

    #[tokio::test]
    async fn issued_at_beyond_leeway_is_rejected() {
        let now = 1_700_000_000;
        let mut claims = user_claims(now);
        claims["nbf"] = json!(now);
        claims["iat"] = json!(now + 61);
        assert_eq!(
            check(claims, now).await.unwrap_err(),
            AuthError::IssuedInFuture
        );
    }

    #[tokio::test]
    async fn id_tokens_are_rejected() {
        let now = 1_700_000_000;
        let mut claims = user_claims(now);
        claims["typ"] = json!("ID");
        assert_eq!(
            check(claims, now).await.unwrap_err(),
            AuthError::TokenTypeMismatch
        );

        let mut claims = user_claims(now);
        claims.as_object_mut().unwrap().remove("typ");
        assert!(check(claims, now).await.is_ok());
    }

    #[tokio::test]
    async fn malformed_tokens_are_invalid() {
        let verifier = verifier();
        for raw in ["", "abc", "a.b", "a.b.c.d", "!!!.e30.sig"] {
            let err = verifier.verify_at(raw, AUDIENCE, 0).await.unwrap_err();
            assert!(matches!(err, AuthError::TokenInvalid(_)), "{raw}: {err:?}");
        }
    }

    #[tokio::test]
    async fn unreachable_provider_is_upstream_unavailable() {
        let now = 1_700_000_000;
        let verifier = verifier_with(
            StubFetcher::failing(),
            VerifierConfig::new(ISSUER, AUDIENCE),
        );
        let err = verifier
            .verify_at(&sign(&user_claims(now)), AUDIENCE, now)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn user_endpoints_refuse_service_principals() {
        let mut claims = service_claims(now());
        claims["aud"] = json!(AUDIENCE);
        let err = verifier().verify_user(&sign(&claims)).await.unwrap_err();
        assert_eq!(err, AuthError::UserTokenRequired);
    }

    #[tokio::test]
    async fn service_endpoints_require_service_principals() {
        let verifier = verifier();

        let claims = verifier
            .verify_service(&sign(&service_claims(now())))
            .await
            .unwrap();
        assert!(claims.is_service());
        assert_eq!(claims.client_id.as_deref(), Some("makrx-store"));

        let mut user = user_claims(now());
        user["aud"] = json!(SERVICE_AUDIENCE);
        let err = verifier.verify_service(&sign(&user)).await.unwrap_err();
        assert_eq!(err, AuthError::ServiceTokenRequired);

        // A user-audience service token is still the wrong audience
        let mut wrong_aud = service_claims(now());
        wrong_aud["aud"] = json!(AUDIENCE);
        let err = verifier.verify_service(&sign(&wrong_aud)).await.unwrap_err();
        assert_eq!(err, AuthError::AudienceMismatch);
    }

    #[tokio::test]
    async fn service_calls_are_refused_without_service_audience() {
        let verifier = verifier_with(
            StubFetcher::always(jwks_of(vec![trusted_jwk(TRUSTED_KID)])),
            VerifierConfig::new(ISSUER, AUDIENCE),
        );
        let err = verifier
            .verify_service(&sign(&service_claims(now())))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::ServiceTokenRequired);
    }

    #[test]
    fn jwks_url_defaults_under_issuer() {
        let config = VerifierConfig::new("https://auth.makrx.org/realms/makrx/", AUDIENCE);
        assert_eq!(
            config.jwks_url,
            "https://auth.makrx.org/realms/makrx/protocol/openid-connect/certs"
        );
        assert_eq!(config.allowed_algorithms, vec![Algorithm::RS256]);
        assert_eq!(config.leeway, 60);
    }
}
