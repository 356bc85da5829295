// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Test fixtures: RSA keys, JWKS stubs and token signing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::sync::watch;

use super::error::AuthError;
use super::jwks::JwksFetcher;

pub const ISSUER: &str = "https://auth.makrx.test/realms/makrx";
pub const AUDIENCE: &str = "makrcave-backend";
pub const SERVICE_AUDIENCE: &str = "makrx-services";
pub const JWKS_URL: &str = "https://auth.makrx.test/realms/makrx/protocol/openid-connect/certs";
pub const TRUSTED_KID: &str = "trusted-key";

const TRUSTED_PRIVATE_PEM: &str = include_str!("../../tests/fixtures/trusted_rsa_private.pem");
const TRUSTED_PUBLIC_JWK: &str = include_str!("../../tests/fixtures/trusted_rsa_public.json");
const ROGUE_PRIVATE_PEM: &str = include_str!("../../tests/fixtures/rogue_rsa_private.pem");
const ROGUE_PUBLIC_JWK: &str = include_str!("../../tests/fixtures/rogue_rsa_public.json");

fn jwk_from(public: &str, kid: &str) -> Jwk {
    let mut value: Value = serde_json::from_str(public).unwrap();
    value["kid"] = json!(kid);
    value["alg"] = json!("RS256");
    value["use"] = json!("sig");
    serde_json::from_value(value).unwrap()
}

/// Public half of the key tokens are normally signed with.
pub fn trusted_jwk(kid: &str) -> Jwk {
    jwk_from(TRUSTED_PUBLIC_JWK, kid)
}

/// Public half of a second, unrelated key.
pub fn rogue_jwk(kid: &str) -> Jwk {
    jwk_from(ROGUE_PUBLIC_JWK, kid)
}

pub fn jwks_of(keys: Vec<Jwk>) -> JwkSet {
    JwkSet { keys }
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Claims of a valid user access token issued at `now`.
pub fn user_claims(now: i64) -> Value {
    json!({
        "sub": "user-123",
        "iss": ISSUER,
        "aud": AUDIENCE,
        "exp": now + 300,
        "iat": now,
        "nbf": now,
        "typ": "Bearer",
        "email": "maker@example.com",
        "email_verified": true,
        "preferred_username": "maker",
        "name": "Maker One",
        "realm_access": { "roles": ["user"] },
        "groups": ["makerspace:ms-1"],
        "makerspace_id": "ms-1",
    })
}

/// Claims of a valid client-credentials token for a service account.
pub fn service_claims(now: i64) -> Value {
    json!({
        "sub": "5d1f0c8e-service",
        "iss": ISSUER,
        "aud": SERVICE_AUDIENCE,
        "exp": now + 300,
        "iat": now,
        "typ": "Bearer",
        "preferred_username": "service-account-makrx-store",
        "client_id": "makrx-store",
        "realm_access": { "roles": [] },
    })
}

fn sign_with(claims: &Value, alg: Algorithm, kid: &str, pem: &str) -> String {
    let mut header = Header::new(alg);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

/// RS256 token signed with the trusted key.
pub fn sign(claims: &Value) -> String {
    sign_with(claims, Algorithm::RS256, TRUSTED_KID, TRUSTED_PRIVATE_PEM)
}

/// Token signed with the trusted key using `alg` (an RSA family algorithm).
pub fn sign_rsa_alg(claims: &Value, alg: Algorithm) -> String {
    sign_with(claims, alg, TRUSTED_KID, TRUSTED_PRIVATE_PEM)
}

/// Token signed with the rogue key but claiming `kid`.
pub fn sign_rogue(claims: &Value, kid: &str) -> String {
    sign_with(claims, Algorithm::RS256, kid, ROGUE_PRIVATE_PEM)
}

/// HS256 token whose secret is the trusted key's public modulus, the classic
/// algorithm-confusion attack.
pub fn sign_hs256_confusion(claims: &Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(TRUSTED_KID.to_string());
    let secret: Value = serde_json::from_str(TRUSTED_PUBLIC_JWK).unwrap();
    let key = EncodingKey::from_secret(secret["n"].as_str().unwrap().as_bytes());
    encode(&header, claims, &key).unwrap()
}

/// Unsigned token declaring `"alg": "none"`.
pub fn unsigned_none(claims: &Value) -> String {
    let header = json!({ "alg": "none", "typ": "JWT", "kid": TRUSTED_KID });
    format!(
        "{}.{}.",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

/// Scripted [`JwksFetcher`] that counts calls and can be held open.
pub struct StubFetcher {
    responses: Mutex<VecDeque<Result<JwkSet, AuthError>>>,
    calls: AtomicUsize,
    gate: watch::Sender<bool>,
}

impl StubFetcher {
    /// Replay `responses` in order, repeating the last one forever.
    pub fn sequence(responses: Vec<Result<JwkSet, AuthError>>) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            gate,
        }
    }

    pub fn always(jwks: JwkSet) -> Self {
        Self::sequence(vec![Ok(jwks)])
    }

    pub fn failing() -> Self {
        Self::sequence(vec![Err(AuthError::UpstreamUnavailable(
            "connection refused".into(),
        ))])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Block subsequent fetches until [`StubFetcher::resume`].
    pub fn pause(&self) {
        self.gate.send_replace(false);
    }

    pub fn resume(&self) {
        self.gate.send_replace(true);
    }

    fn next_response(&self) -> Result<JwkSet, AuthError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.pop_front().unwrap()
        } else {
            responses
                .front()
                .cloned()
                .unwrap_or_else(|| Err(AuthError::UpstreamUnavailable("no response".into())))
        }
    }
}

#[async_trait]
impl JwksFetcher for StubFetcher {
    async fn fetch(&self, _jwks_url: &str) -> Result<JwkSet, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        self.next_response()
    }
}
