//! Turn adapter: the protocol entry point.
//!
//! [`CloudAdapter::process`] authenticates the request, parses the body into
//! an [`Activity`], builds a [`TurnContext`] for the activity's service URL
//! and hands it to a [`Bot`]. Rejected requests never reach the bot.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use tracing::{debug, warn};

use crate::activity::{Activity, ActivityType};
use crate::auth::InboundAuthenticator;
use crate::connector::{ChannelClientFactory, ChannelError, TurnContext};
use crate::host::{EmitError, SessionError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Anything that aborts a turn after it was accepted.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// A channel send/update failed.
    #[error("channel call failed: {0}")]
    Channel(#[from] ChannelError),
    /// The emitter failed while a hook was emitting.
    #[error("emit failed: {0}")]
    Emit(#[from] EmitError),
    /// Session file storage failed.
    #[error("session storage failed: {0}")]
    Storage(#[from] SessionError),
    /// A host lifecycle hook failed.
    #[error("chat hook failed: {0:#}")]
    Hook(#[from] anyhow::Error),
    /// The activity lacks a field the turn needs.
    #[error("activity is missing `{0}`")]
    MissingField(&'static str),
}

// ---------------------------------------------------------------------------
// Bot seam
// ---------------------------------------------------------------------------

/// Turn handler invoked for every accepted activity.
#[async_trait]
pub trait Bot: Send + Sync {
    /// Handle one turn.
    ///
    /// # Errors
    ///
    /// Returns [`TurnError`] when the turn cannot be completed.
    async fn on_turn(&self, turn: &TurnContext) -> Result<(), TurnError>;
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Status and optional JSON body returned to the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// JSON body, if any.
    pub body: Option<serde_json::Value>,
}

impl AdapterResponse {
    fn empty(status: StatusCode) -> Self {
        Self { status, body: None }
    }

    /// 401 with no body.
    pub fn unauthorized() -> Self {
        Self::empty(StatusCode::UNAUTHORIZED)
    }

    /// 400 with no body.
    pub fn bad_request() -> Self {
        Self::empty(StatusCode::BAD_REQUEST)
    }

    /// 202 with no body.
    pub fn accepted() -> Self {
        Self::empty(StatusCode::ACCEPTED)
    }

    /// 501 with no body.
    pub fn not_implemented() -> Self {
        Self::empty(StatusCode::NOT_IMPLEMENTED)
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Authenticates and dispatches inbound channel requests.
pub struct CloudAdapter {
    authenticator: InboundAuthenticator,
    factory: Arc<dyn ChannelClientFactory>,
}

impl std::fmt::Debug for CloudAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudAdapter")
            .field("auth_required", &self.authenticator.is_required())
            .finish_non_exhaustive()
    }
}

impl CloudAdapter {
    /// Create an adapter.
    pub fn new(authenticator: InboundAuthenticator, factory: Arc<dyn ChannelClientFactory>) -> Self {
        Self {
            authenticator,
            factory,
        }
    }

    /// Whether inbound requests must carry a valid bearer token.
    pub fn auth_required(&self) -> bool {
        self.authenticator.is_required()
    }

    /// Process one inbound request.
    ///
    /// # Errors
    ///
    /// Returns the bot's [`TurnError`]. Authentication and parse failures
    /// are responses, not errors.
    pub async fn process(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        bot: &dyn Bot,
    ) -> Result<AdapterResponse, TurnError> {
        let identity = match self.authenticator.authenticate(headers).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "rejected inbound request");
                return Ok(AdapterResponse::unauthorized());
            }
        };

        let activity: Activity = match serde_json::from_slice(body) {
            Ok(activity) => activity,
            Err(e) => {
                warn!(error = %e, "inbound body is not an activity");
                return Ok(AdapterResponse::bad_request());
            }
        };
        if let Err(field) = activity.validate_inbound() {
            warn!(field, "inbound activity is incomplete");
            return Ok(AdapterResponse::bad_request());
        }
        let service_url = activity.service_url.clone().unwrap_or_default();

        if activity.kind == ActivityType::Invoke {
            debug!("invoke activities are not handled");
            return Ok(AdapterResponse::not_implemented());
        }

        debug!(
            activity_type = activity.kind.as_str(),
            conversation_id = activity.conversation_id().unwrap_or_default(),
            "dispatching turn"
        );
        let client = self.factory.create_client(&service_url);
        let turn = TurnContext::new(activity, identity, client);
        bot.on_turn(&turn).await?;
        Ok(AdapterResponse::accepted())
    }
}
