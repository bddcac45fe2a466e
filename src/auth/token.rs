//! Outbound access tokens for the channel service (client-credential flow).
//!
//! [`TokenProvider::get_access_token`] tries a silent cache lookup first and
//! falls back to a full client-credential acquisition through a
//! [`ClientCredentialFlow`]. The cache is a mutex-guarded map keyed by scope
//! set; the lock is never held across an await. Concurrent refreshes for
//! the same scopes both hit the network and the last writer wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

/// Default authority host for client-credential requests.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Tenant used when none is configured (multi-tenant bot registrations).
pub const DEFAULT_TENANT: &str = "botframework.com";

/// Tokens are treated as expired this long before their real expiry.
const EXPIRY_SKEW_SECS: i64 = 300;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// HTTP connect timeout for the token endpoint.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP request timeout for the token endpoint.
const REQUEST_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from outbound token acquisition.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Neither the cache nor the full flow produced a token.
    #[error("Failed to acquire token: {}", acquisition_detail(.code, .description))]
    Acquisition {
        /// Upstream error code (e.g. `invalid_client`).
        code: Option<String>,
        /// Upstream error description.
        description: Option<String>,
    },
    /// Transport failure talking to the token endpoint.
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The token endpoint returned a body that is not a token response.
    #[error("token response parse error: {0}")]
    Parse(String),
    /// The requested flow is not available in this deployment shape.
    #[error("{0} token flow is not supported")]
    Unsupported(&'static str),
}

fn acquisition_detail<'a>(code: &'a Option<String>, description: &'a Option<String>) -> &'a str {
    description
        .as_deref()
        .or(code.as_deref())
        .unwrap_or("unknown")
}

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

/// A cached access token.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Bearer value.
    pub secret: String,
    /// When the token stops being served from the cache.
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    /// Whether the token can still be served silently.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Raw token endpoint response (success or error shape).
#[derive(Debug, Default, Deserialize)]
pub struct TokenResponse {
    /// Issued token.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Error code.
    #[serde(default)]
    pub error: Option<String>,
    /// Human-readable error description.
    #[serde(default)]
    pub error_description: Option<String>,
}

// ---------------------------------------------------------------------------
// Full acquisition seam
// ---------------------------------------------------------------------------

/// A full (non-cached) client-credential token acquisition.
#[async_trait]
pub trait ClientCredentialFlow: Send + Sync {
    /// Request a token for `scopes` from the identity platform.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] on transport or parse failure. Identity
    /// platform rejections come back as a [`TokenResponse`] with `error` set.
    async fn acquire_token_for_client(&self, scopes: &[String])
        -> Result<TokenResponse, TokenError>;
}

/// Client-credential flow against the Microsoft identity platform.
pub struct MsalClient {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl std::fmt::Debug for MsalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsalClient")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

impl MsalClient {
    /// Create a client for `authority` (or the tenant's default authority).
    pub fn new(
        client_id: String,
        client_secret: String,
        tenant_id: Option<&str>,
        authority: Option<&str>,
    ) -> Self {
        let authority = match authority {
            Some(authority) => authority.trim_end_matches('/').to_owned(),
            None => format!(
                "{DEFAULT_AUTHORITY_HOST}/{}",
                tenant_id.unwrap_or(DEFAULT_TENANT)
            ),
        };
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeouts, using default");
                reqwest::Client::default()
            });
        Self {
            client,
            token_url: format!("{authority}/oauth2/v2.0/token"),
            client_id,
            client_secret,
        }
    }

    /// Token endpoint URL this client posts to.
    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

#[async_trait]
impl ClientCredentialFlow for MsalClient {
    async fn acquire_token_for_client(
        &self,
        scopes: &[String],
    ) -> Result<TokenResponse, TokenError> {
        let scope = scopes.join(" ");
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];
        let resp = self.client.post(&self.token_url).form(&params).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        serde_json::from_str::<TokenResponse>(&body).map_err(|e| {
            TokenError::Parse(format!("status {status}: {e}"))
        })
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Process-wide token cache keyed by scope set.
#[derive(Debug, Default)]
pub struct TokenCache {
    slots: Mutex<HashMap<String, AccessToken>>,
}

impl TokenCache {
    /// Silent lookup: a fresh token for `key`, if cached.
    pub fn get(&self, key: &str) -> Option<AccessToken> {
        let now = Utc::now();
        match self.slots.lock() {
            Ok(slots) => slots.get(key).filter(|t| t.is_fresh(now)).cloned(),
            Err(_) => None,
        }
    }

    /// Store a token, replacing any previous one for `key`.
    pub fn insert(&self, key: String, token: AccessToken) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.insert(key, token);
        }
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Acquires and caches access tokens for calling the channel service.
pub struct TokenProvider {
    flow: Arc<dyn ClientCredentialFlow>,
    cache: TokenCache,
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider").finish_non_exhaustive()
    }
}

impl TokenProvider {
    /// Create a provider backed by `flow` with an empty cache.
    pub fn new(flow: Arc<dyn ClientCredentialFlow>) -> Self {
        Self {
            flow,
            cache: TokenCache::default(),
        }
    }

    /// Return an access token for `resource_url`/`scopes`.
    ///
    /// Empty `scopes` means `{resource_url}/.default`. Unless
    /// `force_refresh` is set, a fresh cached token is returned without any
    /// network call.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Acquisition`] carrying the upstream error
    /// code and description when no token could be obtained.
    pub async fn get_access_token(
        &self,
        resource_url: &str,
        scopes: &[String],
        force_refresh: bool,
    ) -> Result<String, TokenError> {
        let scopes = if scopes.is_empty() {
            vec![format!("{}/.default", resource_url.trim_end_matches('/'))]
        } else {
            scopes.to_vec()
        };
        let key = scopes.join(" ");

        if !force_refresh {
            if let Some(token) = self.cache.get(&key) {
                debug!(scope = %key, "access token served from cache");
                return Ok(token.secret);
            }
        }

        let response = self.flow.acquire_token_for_client(&scopes).await?;
        let Some(secret) = response.access_token.filter(|t| !t.is_empty()) else {
            warn!(
                scope = %key,
                error = response.error.as_deref().unwrap_or("unknown"),
                "client-credential token acquisition failed"
            );
            return Err(TokenError::Acquisition {
                code: response.error,
                description: response.error_description,
            });
        };

        let lifetime = response
            .expires_in
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
            .saturating_sub(EXPIRY_SKEW_SECS)
            .max(0);
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(TimeDelta::seconds(lifetime))
            .unwrap_or(now);
        self.cache.insert(
            key.clone(),
            AccessToken {
                secret: secret.clone(),
                expires_at,
            },
        );
        debug!(scope = %key, %expires_at, "access token acquired");
        Ok(secret)
    }

    /// On-behalf-of exchange. Not available for a single-credential bot.
    ///
    /// # Errors
    ///
    /// Always returns [`TokenError::Unsupported`].
    pub async fn acquire_token_on_behalf_of(
        &self,
        _scopes: &[String],
        _user_assertion: &str,
    ) -> Result<String, TokenError> {
        Err(TokenError::Unsupported("on-behalf-of"))
    }

    /// Agentic application token. Not available in this deployment.
    ///
    /// # Errors
    ///
    /// Always returns [`TokenError::Unsupported`].
    pub async fn get_agentic_application_token(
        &self,
        _agent_app_instance_id: &str,
    ) -> Result<String, TokenError> {
        Err(TokenError::Unsupported("agentic application"))
    }

    /// Agentic instance token. Not available in this deployment.
    ///
    /// # Errors
    ///
    /// Always returns [`TokenError::Unsupported`].
    pub async fn get_agentic_instance_token(
        &self,
        _agent_app_instance_id: &str,
    ) -> Result<String, TokenError> {
        Err(TokenError::Unsupported("agentic instance"))
    }

    /// Agentic user token. Not available in this deployment.
    ///
    /// # Errors
    ///
    /// Always returns [`TokenError::Unsupported`].
    pub async fn get_agentic_user_token(
        &self,
        _agent_app_instance_id: &str,
        _agentic_user_id: &str,
        _scopes: &[String],
    ) -> Result<String, TokenError> {
        Err(TokenError::Unsupported("agentic user"))
    }
}
