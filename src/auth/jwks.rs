// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Cache policy
//!
//! - Fresh hit: returned immediately.
//! - Stale hit: returned immediately, and a detached background refresh is
//!   started (at most one per key id). Callers get eventual consistency.
//! - Stale beyond the maximum staleness (refreshes kept failing): treated as
//!   a miss.
//! - Miss: the full key set is fetched synchronously; an absent key id is
//!   [`AuthError::KeyNotFound`]. Concurrent misses share one fetch, and a
//!   miss within the minimum refetch interval of the last fetch (or failed
//!   fetch) is answered from the cache without touching the network.
//!
//! Every fetch replaces the whole key set, so keys rotated out of the
//! identity provider's JWKS stop being trusted. Callers already holding an
//! `Arc<SigningKey>` finish their verification with it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::{Mutex, RwLock};
use url::Url;

use super::error::AuthError;

/// Default JWKS cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// How long past expiry a stale key may still be served.
pub const DEFAULT_MAX_STALENESS: Duration = Duration::from_secs(300);

/// Minimum spacing of cache-miss fetches.
pub const DEFAULT_MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(10);

/// Default JWKS HTTP timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Public key components as published in the JWKS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    Rsa { n: String, e: String },
    Ec { x: String, y: String },
}

/// A verified-usable public signing key. Immutable once cached.
pub struct SigningKey {
    pub key_id: String,
    /// Algorithm the JWK declares, if any.
    pub algorithm: Option<Algorithm>,
    pub material: KeyMaterial,
    pub cached_at: Instant,
    pub expires_at: Instant,
    decoding_key: DecodingKey,
}

impl SigningKey {
    /// Convert a JWK into a signing key valid for `ttl`.
    pub fn from_jwk(jwk: &Jwk, ttl: Duration) -> Result<Self, AuthError> {
        let key_id = jwk
            .common
            .key_id
            .clone()
            .ok_or_else(|| AuthError::Internal("JWK has no key id".to_string()))?;

        if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
            return Err(AuthError::Internal(format!(
                "JWK {key_id} is an encryption key"
            )));
        }

        let (decoding_key, material) = match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => {
                let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e).map_err(|e| {
                    AuthError::Internal(format!("Failed to create RSA key {key_id}: {e}"))
                })?;
                let material = KeyMaterial::Rsa {
                    n: rsa.n.clone(),
                    e: rsa.e.clone(),
                };
                (key, material)
            }
            AlgorithmParameters::EllipticCurve(ec) => {
                let key = DecodingKey::from_ec_components(&ec.x, &ec.y).map_err(|e| {
                    AuthError::Internal(format!("Failed to create EC key {key_id}: {e}"))
                })?;
                let material = KeyMaterial::Ec {
                    x: ec.x.clone(),
                    y: ec.y.clone(),
                };
                (key, material)
            }
            _ => {
                return Err(AuthError::Internal(format!(
                    "Unsupported key type for JWK {key_id}"
                )))
            }
        };

        let cached_at = Instant::now();
        Ok(Self {
            key_id,
            algorithm: jwk.common.key_algorithm.and_then(signing_algorithm),
            material,
            cached_at,
            expires_at: cached_at + ttl,
            decoding_key,
        })
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Whether the key is more than `max_stale` past expiry.
    fn is_past(&self, max_stale: Duration) -> bool {
        self.expires_at
            .checked_add(max_stale)
            .is_some_and(|limit| Instant::now() >= limit)
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("material", &self.material)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Map a JWK `alg` to a JWS signing algorithm.
///
/// Symmetric and key-management algorithms have no business in a public
/// signing key set and map to `None`.
fn signing_algorithm(alg: KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        _ => None,
    }
}

/// Source of the identity provider's key set.
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    async fn fetch(&self, jwks_url: &str) -> Result<JwkSet, AuthError>;
}

/// Fetches the JWKS over HTTPS.
#[derive(Clone)]
pub struct HttpJwksFetcher {
    client: reqwest::Client,
    allow_http: bool,
}

impl HttpJwksFetcher {
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            allow_http: false,
        })
    }

    /// Permit plain-HTTP JWKS URLs (local development only).
    pub fn allow_insecure_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch(&self, jwks_url: &str) -> Result<JwkSet, AuthError> {
        let url = Url::parse(jwks_url)
            .map_err(|e| AuthError::UpstreamUnavailable(format!("invalid JWKS URL: {e}")))?;
        if url.scheme() != "https" && !self.allow_http {
            return Err(AuthError::UpstreamUnavailable(format!(
                "refusing non-HTTPS JWKS URL {url}"
            )));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::UpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::UpstreamUnavailable(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::UpstreamUnavailable(format!("malformed JWKS: {e}")))
    }
}

/// Cached keys plus the key ids with a background refresh in flight.
#[derive(Default)]
struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
    refreshing: HashSet<String>,
    fetched_at: Option<Instant>,
    last_failure: Option<(Instant, AuthError)>,
}

impl KeySet {
    /// Replace all cached keys with the usable entries of `jwks`.
    fn replace_from(&mut self, jwks: &JwkSet, ttl: Duration) {
        let mut keys = HashMap::with_capacity(jwks.keys.len());
        for jwk in &jwks.keys {
            match SigningKey::from_jwk(jwk, ttl) {
                Ok(key) => {
                    keys.insert(key.key_id.clone(), Arc::new(key));
                }
                Err(e) => tracing::debug!(error = %e, "skipping unusable JWK"),
            }
        }
        self.keys = keys;
        self.fetched_at = Some(Instant::now());
        self.last_failure = None;
    }

    fn fetched_within(&self, interval: Duration) -> bool {
        self.fetched_at.is_some_and(|at| at.elapsed() < interval)
    }

    fn recent_failure(&self, interval: Duration) -> Option<AuthError> {
        self.last_failure
            .as_ref()
            .filter(|(at, _)| at.elapsed() < interval)
            .map(|(_, error)| error.clone())
    }
}

/// Key-id indexed cache of the identity provider's signing keys.
///
/// Cloning shares the underlying cache.
#[derive(Clone)]
pub struct KeyCache {
    ttl: Duration,
    max_stale: Duration,
    min_refetch_interval: Duration,
    inner: Arc<RwLock<KeySet>>,
    /// Serializes cache-miss fetches
    miss_fetch: Arc<Mutex<()>>,
    fetcher: Arc<dyn JwksFetcher>,
}

impl KeyCache {
    pub fn new(fetcher: Arc<dyn JwksFetcher>) -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            max_stale: DEFAULT_MAX_STALENESS,
            min_refetch_interval: DEFAULT_MIN_REFETCH_INTERVAL,
            inner: Arc::new(RwLock::new(KeySet::default())),
            miss_fetch: Arc::new(Mutex::new(())),
            fetcher,
        }
    }

    /// Create with custom cache TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Limit on serving a stale key while refreshes fail.
    pub fn with_max_staleness(mut self, max_stale: Duration) -> Self {
        self.max_stale = max_stale;
        self
    }

    /// Minimum spacing of cache-miss fetches.
    pub fn with_min_refetch_interval(mut self, interval: Duration) -> Self {
        self.min_refetch_interval = interval;
        self
    }

    /// Look up the signing key for `key_id`.
    pub async fn get_key(
        &self,
        key_id: &str,
        jwks_url: &str,
    ) -> Result<Arc<SigningKey>, AuthError> {
        let cached = self.inner.read().await.keys.get(key_id).cloned();

        if let Some(key) = cached.filter(|key| !key.is_past(self.max_stale)) {
            if key.is_expired() {
                self.refresh_in_background(key_id, jwks_url).await;
            }
            return Ok(key);
        }

        self.fetch_on_miss(key_id, jwks_url).await
    }

    async fn fetch_on_miss(
        &self,
        key_id: &str,
        jwks_url: &str,
    ) -> Result<Arc<SigningKey>, AuthError> {
        let _fetching = self.miss_fetch.lock().await;

        // Whoever held the lock before may have fetched already
        {
            let set = self.inner.read().await;
            if let Some(error) = set.recent_failure(self.min_refetch_interval) {
                return Err(error);
            }
            let recent = set.fetched_within(self.min_refetch_interval);
            match set.keys.get(key_id) {
                Some(key) if recent || !key.is_past(self.max_stale) => return Ok(key.clone()),
                None if recent => {
                    tracing::debug!(kid = %key_id, "unknown kid, JWKS fetched recently");
                    return Err(AuthError::KeyNotFound(key_id.to_string()));
                }
                _ => {}
            }
        }

        let fetched = self.fetcher.fetch(jwks_url).await;
        let mut set = self.inner.write().await;
        let jwks = match fetched {
            Ok(jwks) => jwks,
            Err(e) => {
                set.last_failure = Some((Instant::now(), e.clone()));
                return Err(e);
            }
        };
        set.replace_from(&jwks, self.ttl);
        tracing::debug!(keys = set.keys.len(), "JWKS fetched on cache miss");

        set.keys
            .get(key_id)
            .cloned()
            .ok_or_else(|| AuthError::KeyNotFound(key_id.to_string()))
    }

    /// Synchronously re-fetch the whole key set.
    ///
    /// Returns the number of usable keys.
    pub async fn refresh(&self, jwks_url: &str) -> Result<usize, AuthError> {
        let jwks = self.fetcher.fetch(jwks_url).await?;
        let mut set = self.inner.write().await;
        set.replace_from(&jwks, self.ttl);
        Ok(set.keys.len())
    }

    /// Whether at least one unexpired key is cached.
    pub async fn is_warm(&self) -> bool {
        self.inner
            .read()
            .await
            .keys
            .values()
            .any(|key| !key.is_expired())
    }

    /// Number of cached keys, stale ones included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.keys.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn refresh_in_background(&self, key_id: &str, jwks_url: &str) {
        if !self.inner.write().await.refreshing.insert(key_id.to_string()) {
            return;
        }

        let cache = self.clone();
        let key_id = key_id.to_string();
        let jwks_url = jwks_url.to_string();
        tokio::spawn(async move {
            let fetched = cache.fetcher.fetch(&jwks_url).await;
            let mut set = cache.inner.write().await;
            set.refreshing.remove(&key_id);
            match fetched {
                Ok(jwks) => {
                    set.replace_from(&jwks, cache.ttl);
                    if !set.keys.contains_key(&key_id) {
                        tracing::info!(kid = %key_id, "signing key rotated out of JWKS");
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        kid = %key_id,
                        error = %e,
                        "background JWKS refresh failed, serving stale key"
                    );
                }
            }
        });
    }
}
