//! Per-turn channel handle.

use std::sync::Arc;

use super::{ChannelClient, ChannelError, ResourceResponse};
use crate::activity::Activity;
use crate::auth::ClaimsIdentity;

/// The inbound activity of one turn plus the capability to answer it.
///
/// Cloning is cheap; the emitter and the bridge hold their own copies.
#[derive(Clone)]
pub struct TurnContext {
    activity: Arc<Activity>,
    identity: Option<ClaimsIdentity>,
    client: Arc<dyn ChannelClient>,
}

impl std::fmt::Debug for TurnContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnContext")
            .field("activity_id", &self.activity.id)
            .field("conversation_id", &self.activity.conversation_id())
            .finish_non_exhaustive()
    }
}

impl TurnContext {
    /// Bundle an inbound activity with the client for replying to it.
    pub fn new(
        activity: Activity,
        identity: Option<ClaimsIdentity>,
        client: Arc<dyn ChannelClient>,
    ) -> Self {
        Self {
            activity: Arc::new(activity),
            identity,
            client,
        }
    }

    /// The inbound activity.
    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// The authenticated caller, `None` in dev mode.
    pub fn identity(&self) -> Option<&ClaimsIdentity> {
        self.identity.as_ref()
    }

    /// Send `activity` into the inbound conversation.
    ///
    /// # Errors
    ///
    /// Propagates the channel client's error.
    pub async fn send_activity(
        &self,
        mut activity: Activity,
    ) -> Result<ResourceResponse, ChannelError> {
        activity.apply_reply_reference(&self.activity);
        self.client.send_activity(&activity).await
    }

    /// Replace a previously sent activity (addressed by `activity.id`).
    ///
    /// # Errors
    ///
    /// Propagates the channel client's error.
    pub async fn update_activity(
        &self,
        mut activity: Activity,
    ) -> Result<ResourceResponse, ChannelError> {
        if activity.conversation.is_none() {
            activity.conversation.clone_from(&self.activity.conversation);
        }
        if activity.service_url.is_none() {
            activity.service_url.clone_from(&self.activity.service_url);
        }
        if activity.channel_id.is_none() {
            activity.channel_id.clone_from(&self.activity.channel_id);
        }
        self.client.update_activity(&activity).await
    }
}
