//! Inbound request authentication.
//!
//! [`InboundAuthenticator::authenticate`] runs before any turn processing:
//! - bearer token present: validated against the configured app identity;
//! - no token and a client id configured: rejected;
//! - no token and no client id configured (dev mode): accepted without an
//!   identity. A token presented in dev mode cannot be validated and is
//!   rejected.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::AuthError;

/// Issuer of tokens minted by the Bot Framework channel service.
pub const BOT_FRAMEWORK_ISSUER: &str = "https://api.botframework.com";

/// Signing keys for Bot Framework issued tokens.
pub const BOT_FRAMEWORK_JWKS_URL: &str = "https://login.botframework.com/v1/.well-known/keys";

/// Signing keys for Entra ID issued tokens.
pub const ENTRA_JWKS_URL: &str = "https://login.microsoftonline.com/common/discovery/v2.0/keys";

/// Minimum interval between key set refreshes.
const JWKS_REFRESH_INTERVAL_SECS: u64 = 300;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The verified caller of an inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClaimsIdentity {
    /// Token audience (the bot's app id).
    pub audience: Option<String>,
    /// Token issuer.
    pub issuer: Option<String>,
    /// Calling application id (`appid` / `azp`).
    pub app_id: Option<String>,
    /// Service URL the channel asserted in the token.
    pub service_url: Option<String>,
}

/// Claims read from a validated channel token.
#[derive(Debug, Deserialize)]
struct ChannelClaims {
    #[serde(default)]
    aud: Option<serde_json::Value>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    appid: Option<String>,
    #[serde(default)]
    azp: Option<String>,
    #[serde(default, rename = "serviceurl")]
    service_url: Option<String>,
}

impl From<ChannelClaims> for ClaimsIdentity {
    fn from(claims: ChannelClaims) -> Self {
        let audience = match claims.aud {
            Some(serde_json::Value::String(aud)) => Some(aud),
            Some(serde_json::Value::Array(values)) => values
                .into_iter()
                .find_map(|v| v.as_str().map(str::to_owned)),
            _ => None,
        };
        Self {
            audience,
            issuer: claims.iss,
            app_id: claims.appid.or(claims.azp),
            service_url: claims.service_url,
        }
    }
}

// ---------------------------------------------------------------------------
// Key sets
// ---------------------------------------------------------------------------

/// A JWK entry from a key set document.
#[derive(Debug, Deserialize)]
struct JwkEntry {
    kid: Option<String>,
    kty: String,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<JwkEntry>,
}

/// Caches the signing keys of one key set URL, with rate-limited refresh.
pub struct JwksCache {
    keys: RwLock<HashMap<String, (Algorithm, DecodingKey)>>,
    jwks_url: String,
    last_refresh: RwLock<Option<Instant>>,
    client: reqwest::Client,
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("jwks_url", &self.jwks_url)
            .finish_non_exhaustive()
    }
}

impl JwksCache {
    /// Create an empty cache; the first lookup fetches the key set.
    pub fn new(jwks_url: String) -> Arc<Self> {
        Arc::new(Self {
            keys: RwLock::new(HashMap::new()),
            jwks_url,
            last_refresh: RwLock::new(None),
            client: reqwest::Client::new(),
        })
    }

    /// Create a cache with pre-loaded keys that never fetches.
    #[doc(hidden)]
    pub fn with_keys(keys: HashMap<String, (Algorithm, DecodingKey)>) -> Arc<Self> {
        Arc::new(Self {
            keys: RwLock::new(keys),
            jwks_url: String::new(),
            last_refresh: RwLock::new(Some(Instant::now())),
            client: reqwest::Client::new(),
        })
    }

    /// Look up `kid`, refreshing the key set once if it is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Jwks`] if the refresh fails.
    pub async fn get_key(&self, kid: &str) -> Result<Option<(Algorithm, DecodingKey)>, AuthError> {
        if let Some(found) = self.cached(kid).await {
            return Ok(Some(found));
        }
        self.refresh().await?;
        Ok(self.cached(kid).await)
    }

    async fn cached(&self, kid: &str) -> Option<(Algorithm, DecodingKey)> {
        let keys = self.keys.read().await;
        keys.get(kid).map(|(alg, key)| (*alg, key.clone()))
    }

    async fn refresh(&self) -> Result<(), AuthError> {
        if self.jwks_url.is_empty() {
            return Ok(());
        }
        {
            let last = self.last_refresh.read().await;
            if last.is_some_and(|at| at.elapsed() < Duration::from_secs(JWKS_REFRESH_INTERVAL_SECS))
            {
                return Ok(());
            }
        }

        let resp = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::Jwks(format!("{}: {e}", self.jwks_url)))?;
        if !resp.status().is_success() {
            return Err(AuthError::Jwks(format!(
                "{} returned HTTP {}",
                self.jwks_url,
                resp.status()
            )));
        }
        let doc: JwksDocument = resp
            .json()
            .await
            .map_err(|e| AuthError::Jwks(format!("failed to parse {}: {e}", self.jwks_url)))?;

        let mut fresh = HashMap::new();
        for jwk in &doc.keys {
            let (Some(kid), "RSA") = (&jwk.kid, jwk.kty.as_str()) else {
                continue;
            };
            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                continue;
            };
            match DecodingKey::from_rsa_components(n, e) {
                Ok(key) => {
                    let alg = match jwk.alg.as_deref() {
                        Some("RS384") => Algorithm::RS384,
                        Some("RS512") => Algorithm::RS512,
                        _ => Algorithm::RS256,
                    };
                    fresh.insert(kid.clone(), (alg, key));
                }
                Err(e) => warn!(kid = %kid, error = %e, "skipping invalid RSA key"),
            }
        }
        debug!(url = %self.jwks_url, keys = fresh.len(), "key set refreshed");

        *self.keys.write().await = fresh;
        *self.last_refresh.write().await = Some(Instant::now());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Validates channel-issued JWTs against the configured app identity.
#[derive(Debug)]
pub struct JwtTokenValidator {
    audience: String,
    issuers: Vec<String>,
    key_sets: Vec<Arc<JwksCache>>,
}

impl JwtTokenValidator {
    /// Create a validator accepting tokens for `audience` from `issuers`,
    /// signed by a key in one of `key_sets`.
    pub fn new(audience: String, issuers: Vec<String>, key_sets: Vec<Arc<JwksCache>>) -> Self {
        Self {
            audience,
            issuers,
            key_sets,
        }
    }

    /// Validate `token` and return the caller identity.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the token is malformed, signed by an
    /// unknown key, expired, or issued for another audience or issuer.
    pub async fn validate_token(&self, token: &str) -> Result<ClaimsIdentity, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::Malformed(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::Malformed("header missing kid".to_owned()))?;

        let mut found = None;
        for key_set in &self.key_sets {
            if let Some(key) = key_set.get_key(&kid).await? {
                found = Some(key);
                break;
            }
        }
        let (alg, key) = found.ok_or_else(|| AuthError::KeyNotFound(kid.clone()))?;

        let mut validation = Validation::new(alg);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_issuer(&self.issuers);
        validation.validate_exp = true;

        let data = decode::<ChannelClaims>(token, &key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        Ok(data.claims.into())
    }
}

// ---------------------------------------------------------------------------
// Authenticator
// ---------------------------------------------------------------------------

/// Gatekeeper run on every inbound channel request.
#[derive(Debug, Default)]
pub struct InboundAuthenticator {
    validator: Option<JwtTokenValidator>,
}

impl InboundAuthenticator {
    /// Authenticator for a deployment with a configured client id.
    pub fn required(validator: JwtTokenValidator) -> Self {
        Self {
            validator: Some(validator),
        }
    }

    /// Open dev-mode authenticator: no client id, no mandatory token.
    pub fn open() -> Self {
        Self { validator: None }
    }

    /// Whether a bearer token is mandatory.
    pub fn is_required(&self) -> bool {
        self.validator.is_some()
    }

    /// Authenticate a request from its headers.
    ///
    /// Returns `Ok(None)` in dev mode when no identity can be established.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the request must be rejected.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
    ) -> Result<Option<ClaimsIdentity>, AuthError> {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty());

        match (token, &self.validator) {
            (Some(token), Some(validator)) => validator.validate_token(token).await.map(Some),
            (None, Some(_)) => Err(AuthError::MissingToken),
            (Some(_), None) => {
                debug!("bearer token presented but no client id configured");
                Err(AuthError::InvalidToken("no client id configured".to_owned()))
            }
            (None, None) => Ok(None),
        }
    }
}
