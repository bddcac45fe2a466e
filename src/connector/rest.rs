//! Bot Connector REST client.
//!
//! - send: `POST {serviceUrl}/v3/conversations/{conversationId}/activities[/{replyToId}]`
//! - update: `PUT {serviceUrl}/v3/conversations/{conversationId}/activities/{activityId}`

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use super::{check_http_response, ChannelClient, ChannelClientFactory, ChannelError, ResourceResponse};
use crate::activity::Activity;
use crate::auth::TokenProvider;

/// Resource the outbound token is requested for.
pub const CHANNEL_RESOURCE: &str = "https://api.botframework.com";

/// HTTP connect timeout for channel calls.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP request timeout for channel calls.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Build the shared reqwest client used for channel calls.
pub fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "failed to build HTTP client with timeouts, using default");
            reqwest::Client::default()
        })
}

/// Connector client bound to one channel service URL.
#[derive(Debug, Clone)]
pub struct RestConnectorClient {
    client: reqwest::Client,
    service_url: String,
    tokens: Option<Arc<TokenProvider>>,
    scope: String,
}

impl RestConnectorClient {
    /// Create a client. Without a token provider, calls are unauthenticated
    /// (emulator / dev mode).
    pub fn new(
        client: reqwest::Client,
        service_url: String,
        tokens: Option<Arc<TokenProvider>>,
        scope: String,
    ) -> Self {
        Self {
            client,
            service_url,
            tokens,
            scope,
        }
    }

    /// Service URL this client calls.
    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    /// `{serviceUrl}/v3/conversations/{conversation}/activities[/{activity}]`,
    /// with each segment percent-encoded.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidServiceUrl`] if the service URL cannot
    /// carry a path.
    pub fn activities_url(
        &self,
        conversation_id: &str,
        activity_id: Option<&str>,
    ) -> Result<Url, ChannelError> {
        let mut url = Url::parse(&self.service_url)
            .map_err(|_| ChannelError::InvalidServiceUrl(self.service_url.clone()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| ChannelError::InvalidServiceUrl(self.service_url.clone()))?;
            segments
                .pop_if_empty()
                .extend(["v3", "conversations", conversation_id, "activities"]);
            if let Some(activity_id) = activity_id {
                segments.push(activity_id);
            }
        }
        Ok(url)
    }

    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, ChannelError> {
        match &self.tokens {
            Some(tokens) => {
                let token = tokens
                    .get_access_token(CHANNEL_RESOURCE, &[self.scope.clone()], false)
                    .await?;
                Ok(request.bearer_auth(token))
            }
            None => Ok(request),
        }
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        activity: &Activity,
    ) -> Result<ResourceResponse, ChannelError> {
        let request = self.authorize(request).await?;
        let response = request.json(activity).send().await?;
        let body = check_http_response(response).await?;
        Ok(serde_json::from_str(&body).unwrap_or_default())
    }
}

#[async_trait]
impl ChannelClient for RestConnectorClient {
    async fn send_activity(&self, activity: &Activity) -> Result<ResourceResponse, ChannelError> {
        let conversation_id = activity
            .conversation_id()
            .ok_or(ChannelError::MissingField("conversation"))?;
        let url = self.activities_url(conversation_id, activity.reply_to_id.as_deref())?;
        debug!(
            conversation_id,
            activity_type = activity.kind.as_str(),
            "sending activity"
        );
        self.execute(self.client.post(url), activity).await
    }

    async fn update_activity(
        &self,
        activity: &Activity,
    ) -> Result<ResourceResponse, ChannelError> {
        let conversation_id = activity
            .conversation_id()
            .ok_or(ChannelError::MissingField("conversation"))?;
        let activity_id = activity
            .id
            .as_deref()
            .ok_or(ChannelError::MissingField("id"))?;
        let url = self.activities_url(conversation_id, Some(activity_id))?;
        debug!(conversation_id, activity_id, "updating activity");
        self.execute(self.client.put(url), activity).await
    }
}

/// Factory sharing one HTTP client and one credential across service URLs.
#[derive(Debug, Clone)]
pub struct RestClientFactory {
    client: reqwest::Client,
    tokens: Option<Arc<TokenProvider>>,
    scope: String,
}

impl RestClientFactory {
    /// Create a factory. `tokens` is `None` in dev mode.
    pub fn new(tokens: Option<Arc<TokenProvider>>, scope: String) -> Self {
        Self {
            client: build_http_client(),
            tokens,
            scope,
        }
    }
}

impl ChannelClientFactory for RestClientFactory {
    fn create_client(&self, service_url: &str) -> Arc<dyn ChannelClient> {
        Arc::new(RestConnectorClient::new(
            self.client.clone(),
            service_url.to_owned(),
            self.tokens.clone(),
            self.scope.clone(),
        ))
    }
}
