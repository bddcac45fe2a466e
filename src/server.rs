//! HTTP surface: the channel messaging endpoint and a health probe.

use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{error, info, warn};

use crate::adapter::{AdapterResponse, Bot, CloudAdapter};

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    adapter: Arc<CloudAdapter>,
    bot: Arc<dyn Bot>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Bundle the adapter and the bot it dispatches to.
    pub fn new(adapter: Arc<CloudAdapter>, bot: Arc<dyn Bot>) -> Self {
        Self { adapter, bot }
    }
}

impl IntoResponse for AdapterResponse {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        }
    }
}

/// Build the router: `POST {messages_path}` and `GET /health`.
pub fn router(state: AppState, messages_path: &str) -> Router {
    Router::new()
        .route(messages_path, post(messages))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn messages(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    match state.adapter.process(&headers, &body, state.bot.as_ref()).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            error!(error = %e, "turn failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Serve `state` on `bind` until Ctrl+C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(bind: &str, messages_path: &str, state: AppState) -> anyhow::Result<()> {
    let app = router(state, messages_path);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding to {bind}"))?;
    info!(bind, messages_path, "listening for channel activities");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server exited")?;
    info!("server stopped");
    Ok(())
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received, draining connections");
}
