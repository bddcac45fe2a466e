//! HTTP router tests.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use msagents_bridge::adapter::CloudAdapter;
use msagents_bridge::auth::InboundAuthenticator;
use msagents_bridge::bridge::{AttachmentDownloader, MsAgentsBot};
use msagents_bridge::server::{router, AppState};

use crate::support::{
    channel_token, inbound_body, required_authenticator, RecordingFactory, RecordingHooks,
};

const MESSAGES_PATH: &str = "/api/messages";

fn app(
    authenticator: InboundAuthenticator,
    hooks: RecordingHooks,
    root: &std::path::Path,
) -> axum::Router {
    let adapter = Arc::new(CloudAdapter::new(
        authenticator,
        Arc::new(RecordingFactory::default()),
    ));
    let bot = Arc::new(MsAgentsBot::new(
        Arc::new(hooks),
        None,
        AttachmentDownloader::new(Duration::from_secs(1), Duration::from_secs(2)),
        root.to_path_buf(),
    ));
    router(AppState::new(adapter, bot), MESSAGES_PATH)
}

fn post(body: Vec<u8>, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(MESSAGES_PATH)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).expect("request")
}

#[tokio::test]
async fn health_reports_ok() {
    let root = tempfile::tempdir().expect("tempdir");
    let app = app(
        InboundAuthenticator::open(),
        RecordingHooks::default(),
        root.path(),
    );

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn unauthenticated_post_is_401() {
    let root = tempfile::tempdir().expect("tempdir");
    let app = app(
        required_authenticator(),
        RecordingHooks::default(),
        root.path(),
    );

    let response = app
        .oneshot(post(inbound_body("ping"), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn authenticated_post_is_202() {
    let root = tempfile::tempdir().expect("tempdir");
    let app = app(
        required_authenticator(),
        RecordingHooks::replying("pong"),
        root.path(),
    );

    let token = channel_token();
    let response = app
        .oneshot(post(inbound_body("ping"), Some(token.as_str())))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn failing_hook_is_500() {
    let root = tempfile::tempdir().expect("tempdir");
    let app = app(
        InboundAuthenticator::open(),
        RecordingHooks::failing(),
        root.path(),
    );

    let response = app
        .oneshot(post(inbound_body("ping"), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn get_on_messages_path_is_405() {
    let root = tempfile::tempdir().expect("tempdir");
    let app = app(
        InboundAuthenticator::open(),
        RecordingHooks::default(),
        root.path(),
    );

    let response = app
        .oneshot(
            Request::builder()
                .uri(MESSAGES_PATH)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
