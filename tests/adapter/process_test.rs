//! Inbound request processing tests.

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::json;

use msagents_bridge::adapter::CloudAdapter;
use msagents_bridge::auth::InboundAuthenticator;
use msagents_bridge::bridge::{AttachmentDownloader, MsAgentsBot};
use msagents_bridge::host::DataLayer;

use crate::support::{
    channel_token, inbound_body, required_authenticator, RecordingDataLayer, RecordingFactory,
    RecordingHooks, SERVICE_URL,
};

struct Harness {
    _root: tempfile::TempDir,
    factory: Arc<RecordingFactory>,
    hooks: Arc<RecordingHooks>,
    data_layer: Arc<RecordingDataLayer>,
    adapter: CloudAdapter,
    bot: MsAgentsBot,
}

fn harness(authenticator: InboundAuthenticator) -> Harness {
    let root = tempfile::tempdir().expect("tempdir");
    let factory = Arc::new(RecordingFactory::default());
    let hooks = Arc::new(RecordingHooks::replying("pong"));
    let data_layer = Arc::new(RecordingDataLayer::default());
    let bot = MsAgentsBot::new(
        hooks.clone(),
        Some(data_layer.clone() as Arc<dyn DataLayer>),
        AttachmentDownloader::new(Duration::from_secs(1), Duration::from_secs(2)),
        root.path().to_path_buf(),
    );
    Harness {
        adapter: CloudAdapter::new(authenticator, factory.clone()),
        _root: root,
        factory,
        hooks,
        data_layer,
        bot,
    }
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(&format!("Bearer {token}")).expect("header value");
    headers.insert(AUTHORIZATION, value);
    headers
}

#[tokio::test]
async fn missing_token_is_rejected_before_any_side_effect() {
    let h = harness(required_authenticator());
    assert!(h.adapter.auth_required());

    let response = h
        .adapter
        .process(&HeaderMap::new(), &inbound_body("ping"), &h.bot)
        .await
        .expect("process");

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.factory.created(), 0);
    assert_eq!(h.data_layer.user_calls(), 0);
    assert!(h.hooks.events().is_empty());
}

#[tokio::test]
async fn forged_token_is_rejected() {
    let h = harness(required_authenticator());
    let response = h
        .adapter
        .process(&bearer("not.a.jwt"), &inbound_body("ping"), &h.bot)
        .await
        .expect("process");
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.factory.created(), 0);
}

#[tokio::test]
async fn valid_token_dispatches_to_service_url() {
    let h = harness(required_authenticator());
    let response = h
        .adapter
        .process(&bearer(&channel_token()), &inbound_body("ping"), &h.bot)
        .await
        .expect("process");

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(h.factory.service_urls(), vec![SERVICE_URL.to_owned()]);
    assert_eq!(
        h.hooks.events(),
        vec!["start", "message:Ada Lovelace:ping:0", "end"]
    );
    let sent = h.factory.channel.sent();
    assert_eq!(sent.last().and_then(|a| a.text.as_deref()), Some("pong"));
}

#[tokio::test]
async fn open_mode_accepts_unauthenticated_message() {
    let h = harness(InboundAuthenticator::open());
    assert!(!h.adapter.auth_required());

    let response = h
        .adapter
        .process(&HeaderMap::new(), &inbound_body("ping"), &h.bot)
        .await
        .expect("process");
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(h.factory.created(), 1);
}

#[tokio::test]
async fn open_mode_rejects_message_carrying_token() {
    let h = harness(InboundAuthenticator::open());
    let response = h
        .adapter
        .process(&bearer("not-a-jwt"), &inbound_body("ping"), &h.bot)
        .await
        .expect("process");
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.factory.created(), 0);
    assert!(h.hooks.events().is_empty());
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let h = harness(InboundAuthenticator::open());
    let response = h
        .adapter
        .process(&HeaderMap::new(), b"{not json", &h.bot)
        .await
        .expect("process");
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(h.factory.created(), 0);
}

#[tokio::test]
async fn activity_without_conversation_is_bad_request() {
    let h = harness(InboundAuthenticator::open());
    let body = json!({
        "type": "message",
        "serviceUrl": SERVICE_URL,
        "from": { "id": "29:user-1" },
        "text": "hi",
    });
    let response = h
        .adapter
        .process(&HeaderMap::new(), body.to_string().as_bytes(), &h.bot)
        .await
        .expect("process");
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn activity_without_service_url_is_bad_request() {
    let h = harness(InboundAuthenticator::open());
    let body = json!({
        "type": "message",
        "conversation": { "id": "a:1conversation" },
        "from": { "id": "29:user-1" },
        "text": "hi",
    });
    let response = h
        .adapter
        .process(&HeaderMap::new(), body.to_string().as_bytes(), &h.bot)
        .await
        .expect("process");
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(h.factory.created(), 0);
}

#[tokio::test]
async fn invoke_is_not_implemented() {
    let h = harness(InboundAuthenticator::open());
    let body = json!({
        "type": "invoke",
        "name": "adaptiveCard/action",
        "serviceUrl": SERVICE_URL,
        "conversation": { "id": "a:1conversation" },
        "from": { "id": "29:user-1" },
    });
    let response = h
        .adapter
        .process(&HeaderMap::new(), body.to_string().as_bytes(), &h.bot)
        .await
        .expect("process");
    assert_eq!(response.status, StatusCode::NOT_IMPLEMENTED);
    assert!(h.hooks.events().is_empty());
}

#[tokio::test]
async fn conversation_update_is_accepted_without_session() {
    let h = harness(InboundAuthenticator::open());
    let body = json!({
        "type": "conversationUpdate",
        "serviceUrl": SERVICE_URL,
        "conversation": { "id": "a:1conversation" },
        "membersAdded": [{ "id": "28:bot" }],
    });
    let response = h
        .adapter
        .process(&HeaderMap::new(), body.to_string().as_bytes(), &h.bot)
        .await
        .expect("process");
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert!(h.hooks.events().is_empty());
    assert!(h.factory.channel.calls().is_empty());
}
