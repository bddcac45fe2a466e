//! Outbound channel calls: send and update activities.
//!
//! The [`ChannelClient`] trait is the seam between the bridge and the
//! channel service. [`rest::RestConnectorClient`] implements it against the
//! Bot Connector REST API; tests substitute recording clients.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::activity::Activity;
use crate::auth::TokenError;

pub mod rest;
pub mod turn;

pub use rest::{RestClientFactory, RestConnectorClient};
pub use turn::TurnContext;

/// Errors from outbound channel calls.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// HTTP transport failure.
    #[error("channel request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The channel service answered with a non-success status.
    #[error("channel returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },
    /// The activity lacks a field needed to address the call.
    #[error("activity is missing {0}")]
    MissingField(&'static str),
    /// The service URL could not be used as a base URL.
    #[error("invalid service URL {0:?}")]
    InvalidServiceUrl(String),
    /// The outbound access token could not be acquired.
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Channel acknowledgement of a sent or updated activity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ResourceResponse {
    /// Id the channel assigned to the activity.
    #[serde(default)]
    pub id: Option<String>,
}

/// Send/update capability of a channel service.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// Send a new activity to the conversation it addresses.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] on transport, status or token failure.
    async fn send_activity(&self, activity: &Activity) -> Result<ResourceResponse, ChannelError>;

    /// Replace an existing activity (addressed by `activity.id`).
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] on transport, status or token failure.
    async fn update_activity(&self, activity: &Activity)
        -> Result<ResourceResponse, ChannelError>;
}

/// Builds a [`ChannelClient`] for the service URL of an inbound turn.
pub trait ChannelClientFactory: Send + Sync {
    /// Client for calls back to `service_url`.
    fn create_client(&self, service_url: &str) -> Arc<dyn ChannelClient>;
}

/// Check a channel response status and return the body text.
///
/// # Errors
///
/// Returns [`ChannelError::HttpStatus`] with a sanitized body on non-2xx.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, ChannelError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ChannelError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_http_error_body(&body),
        });
    }
    Ok(body)
}

/// Collapse whitespace, redact bearer-looking tokens and truncate.
pub fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [
        r"eyJ[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]*",
        r"(?i)bearer\s+[A-Za-z0-9._\-]{16,}",
    ] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}
