//! Inbound bearer token validation tests.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use serde_json::json;

use msagents_bridge::auth::validator::BOT_FRAMEWORK_ISSUER;
use msagents_bridge::auth::{InboundAuthenticator, JwksCache, JwtTokenValidator};
use msagents_bridge::auth::AuthError;

const APP_ID: &str = "00000000-0000-0000-0000-0000000000aa";
const SIGNING_SECRET: &[u8] = b"test-signing-secret-with-enough-entropy";
const KID: &str = "test-key";

fn key_set() -> Arc<JwksCache> {
    let mut keys = HashMap::new();
    keys.insert(
        KID.to_owned(),
        (Algorithm::HS256, DecodingKey::from_secret(SIGNING_SECRET)),
    );
    JwksCache::with_keys(keys)
}

fn validator() -> JwtTokenValidator {
    JwtTokenValidator::new(
        APP_ID.to_owned(),
        vec![BOT_FRAMEWORK_ISSUER.to_owned()],
        vec![key_set()],
    )
}

fn mint(audience: &str, issuer: &str, kid: &str, exp_offset_secs: i64) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.to_owned());
    let claims = json!({
        "aud": audience,
        "iss": issuer,
        "appid": "channel-service",
        "serviceurl": "https://smba.trafficmanager.net/teams/",
        "exp": Utc::now().timestamp().saturating_add(exp_offset_secs),
    });
    match encode(&header, &claims, &EncodingKey::from_secret(SIGNING_SECRET)) {
        Ok(token) => token,
        Err(err) => panic!("token should encode: {err}"),
    }
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(&format!("Bearer {token}")).expect("header value");
    headers.insert(AUTHORIZATION, value);
    headers
}

#[tokio::test]
async fn valid_token_yields_identity() {
    let token = mint(APP_ID, BOT_FRAMEWORK_ISSUER, KID, 600);
    let identity = validator().validate_token(&token).await.expect("valid token");

    assert_eq!(identity.audience.as_deref(), Some(APP_ID));
    assert_eq!(identity.issuer.as_deref(), Some(BOT_FRAMEWORK_ISSUER));
    assert_eq!(identity.app_id.as_deref(), Some("channel-service"));
    assert_eq!(
        identity.service_url.as_deref(),
        Some("https://smba.trafficmanager.net/teams/")
    );
}

#[tokio::test]
async fn token_for_other_audience_is_rejected() {
    let token = mint("someone-else", BOT_FRAMEWORK_ISSUER, KID, 600);
    assert!(matches!(
        validator().validate_token(&token).await,
        Err(AuthError::InvalidToken(_))
    ));
}

#[tokio::test]
async fn token_from_unknown_issuer_is_rejected() {
    let token = mint(APP_ID, "https://evil.example", KID, 600);
    assert!(matches!(
        validator().validate_token(&token).await,
        Err(AuthError::InvalidToken(_))
    ));
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let token = mint(APP_ID, BOT_FRAMEWORK_ISSUER, KID, -3600);
    assert!(matches!(
        validator().validate_token(&token).await,
        Err(AuthError::InvalidToken(_))
    ));
}

#[tokio::test]
async fn unknown_signing_key_is_rejected() {
    let token = mint(APP_ID, BOT_FRAMEWORK_ISSUER, "rotated-away", 600);
    assert!(matches!(
        validator().validate_token(&token).await,
        Err(AuthError::KeyNotFound(kid)) if kid == "rotated-away"
    ));
}

#[tokio::test]
async fn garbage_token_is_malformed() {
    assert!(matches!(
        validator().validate_token("not-a-jwt").await,
        Err(AuthError::Malformed(_))
    ));
}

#[tokio::test]
async fn required_mode_rejects_missing_token() {
    let auth = InboundAuthenticator::required(validator());
    assert!(auth.is_required());

    assert!(matches!(
        auth.authenticate(&HeaderMap::new()).await,
        Err(AuthError::MissingToken)
    ));

    let mut basic = HeaderMap::new();
    basic.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
    assert!(matches!(
        auth.authenticate(&basic).await,
        Err(AuthError::MissingToken)
    ));
}

#[tokio::test]
async fn required_mode_accepts_valid_bearer() {
    let auth = InboundAuthenticator::required(validator());
    let token = mint(APP_ID, BOT_FRAMEWORK_ISSUER, KID, 600);

    let identity = auth.authenticate(&bearer(&token)).await.expect("authenticated");
    assert!(identity.is_some());
}

#[tokio::test]
async fn required_mode_rejects_invalid_bearer() {
    let auth = InboundAuthenticator::required(validator());
    let token = mint("someone-else", BOT_FRAMEWORK_ISSUER, KID, 600);
    assert!(auth.authenticate(&bearer(&token)).await.is_err());
}

#[tokio::test]
async fn open_mode_proceeds_without_identity() {
    let auth = InboundAuthenticator::open();
    assert!(!auth.is_required());

    let none = auth.authenticate(&HeaderMap::new()).await.expect("dev mode");
    assert!(none.is_none());

}

#[tokio::test]
async fn open_mode_rejects_presented_token() {
    let auth = InboundAuthenticator::open();
    match auth.authenticate(&bearer("not-a-jwt")).await {
        Err(AuthError::InvalidToken(reason)) => assert!(reason.contains("no client id")),
        other => panic!("expected invalid token, got {other:?}"),
    }
}
