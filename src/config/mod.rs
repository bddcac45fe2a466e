//! Configuration loading.
//!
//! Loads bridge configuration from `./msagents-bridge.toml` (or
//! `$MSAGENTS_BRIDGE_CONFIG`). Environment variables override file values;
//! file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::validator::{BOT_FRAMEWORK_ISSUER, BOT_FRAMEWORK_JWKS_URL, ENTRA_JWKS_URL};

/// Config file used when `$MSAGENTS_BRIDGE_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "msagents-bridge.toml";

// ── Top-level config ────────────────────────────────────────────

/// Top-level bridge configuration loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// HTTP surface (`[server]`).
    pub server: ServerConfig,
    /// Channel credentials and inbound validation (`[auth]`).
    pub auth: AuthConfig,
    /// Session file storage (`[storage]`).
    pub storage: StorageConfig,
    /// Attachment download transport (`[downloads]`).
    pub downloads: DownloadConfig,
    /// Log output (`[logging]`).
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$MSAGENTS_BRIDGE_CONFIG` or `./msagents-bridge.toml`.
    /// A missing file yields defaults.
    pub fn load() -> Result<Self> {
        let path = Self::config_path_with(|key| std::env::var(key).ok());
        Self::load_from(&path)
    }

    /// Load from an explicit path, then apply process env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from TOML file only, no env overrides.
    fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("invalid config file {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config file {}: {e}",
                path.display()
            )),
        }
    }

    /// Resolve the config path using a custom env resolver.
    pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        match env("MSAGENTS_BRIDGE_CONFIG") {
            Some(p) if !p.is_empty() => PathBuf::from(p),
            _ => PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Empty values count as unset.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        let env = |key: &str| env(key).filter(|v| !v.is_empty());

        // Credentials.
        if let Some(v) = env("MICROSOFT_APP_ID") {
            self.auth.client_id = Some(v);
        }
        if let Some(v) = env("MICROSOFT_APP_TENANT_ID") {
            self.auth.tenant_id = Some(v);
        }
        if let Some(v) = env("MICROSOFT_APP_PASSWORD") {
            self.auth.client_secret = Some(v);
        }

        // Server, storage, logging.
        if let Some(v) = env("MSAGENTS_BRIDGE_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = env("MSAGENTS_BRIDGE_FILES_DIR") {
            self.storage.files_dir = PathBuf::from(v);
        }
        if let Some(v) = env("MSAGENTS_BRIDGE_LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    /// Parse a TOML string into config.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(toml_str).context("failed to parse config TOML")?;
        config.auth.normalize();
        Ok(config)
    }

    /// Whether inbound requests must carry a bearer token.
    pub fn auth_required(&self) -> bool {
        self.auth.client_id.is_some()
    }
}

// ── Server config ───────────────────────────────────────────────

/// HTTP surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,
    /// Path of the channel messaging endpoint.
    pub messages_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3978".to_string(),
            messages_path: "/api/messages".to_string(),
        }
    }
}

// ── Auth config ─────────────────────────────────────────────────

/// Channel credentials and inbound token validation settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Application (client) id. Unset means unauthenticated dev mode.
    pub client_id: Option<String>,
    /// Directory tenant id.
    pub tenant_id: Option<String>,
    /// Client secret.
    pub client_secret: Option<String>,
    /// Authority URL overriding `https://login.microsoftonline.com/{tenant}`.
    pub authority: Option<String>,
    /// Scope requested for outbound channel tokens.
    pub channel_scope: String,
    /// Key sets inbound tokens are verified against.
    pub jwks_urls: Vec<String>,
    /// Accepted inbound token issuers.
    pub issuers: Vec<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field("tenant_id", &self.tenant_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "__REDACTED__"),
            )
            .field("authority", &self.authority)
            .field("channel_scope", &self.channel_scope)
            .field("jwks_urls", &self.jwks_urls)
            .field("issuers", &self.issuers)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            tenant_id: None,
            client_secret: None,
            authority: None,
            channel_scope: "https://api.botframework.com/.default".to_string(),
            jwks_urls: vec![
                BOT_FRAMEWORK_JWKS_URL.to_string(),
                ENTRA_JWKS_URL.to_string(),
            ],
            issuers: vec![BOT_FRAMEWORK_ISSUER.to_string()],
        }
    }
}

impl AuthConfig {
    /// Treat empty strings in the file as unset.
    fn normalize(&mut self) {
        for field in [
            &mut self.client_id,
            &mut self.tenant_id,
            &mut self.client_secret,
            &mut self.authority,
        ] {
            if field.as_deref().is_some_and(str::is_empty) {
                *field = None;
            }
        }
    }

    /// Accepted issuers, including the tenant's v1 and v2 issuers when a
    /// tenant is configured.
    pub fn effective_issuers(&self) -> Vec<String> {
        let mut issuers = self.issuers.clone();
        if let Some(tenant) = &self.tenant_id {
            for issuer in [
                format!("https://sts.windows.net/{tenant}/"),
                format!("https://login.microsoftonline.com/{tenant}/v2.0"),
            ] {
                if !issuers.contains(&issuer) {
                    issuers.push(issuer);
                }
            }
        }
        issuers
    }
}

// ── Storage config ──────────────────────────────────────────────

/// Session file storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; each session stores files in its own subdirectory.
    pub files_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            files_dir: PathBuf::from(".files"),
        }
    }
}

// ── Download config ─────────────────────────────────────────────

/// Attachment download transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
        }
    }
}

// ── Logging config ──────────────────────────────────────────────

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level filter when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for rotating JSON log files; stderr only when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────
