//! msagents-bridge: Microsoft 365 Agents / Teams channel adapter.
//!
//! `serve` runs the channel messaging endpoint with a built-in echo chat
//! handler; `check-config` prints the resolved configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use msagents_bridge::adapter::CloudAdapter;
use msagents_bridge::auth::{
    InboundAuthenticator, JwksCache, JwtTokenValidator, MsalClient, TokenProvider,
};
use msagents_bridge::bridge::{AttachmentDownloader, MsAgentsBot};
use msagents_bridge::config::BridgeConfig;
use msagents_bridge::connector::RestClientFactory;
use msagents_bridge::host::{ChatContext, ChatHooks, Message};
use msagents_bridge::logging;
use msagents_bridge::server::{self, AppState};

/// Microsoft 365 Agents / Teams channel adapter.
#[derive(Parser)]
#[command(name = "msagents-bridge")]
#[command(about = "Bridge Microsoft Teams channel activities into chat sessions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the channel messaging endpoint
    Serve {
        /// Config file (default: $MSAGENTS_BRIDGE_CONFIG or ./msagents-bridge.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Listen address, overriding the config
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print the resolved configuration with secrets redacted
    CheckConfig {
        /// Config file (default: $MSAGENTS_BRIDGE_CONFIG or ./msagents-bridge.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Replies to every message with its text and the names of attached files.
struct EchoHooks;

#[async_trait]
impl ChatHooks for EchoHooks {
    async fn on_message(&self, ctx: &ChatContext, message: &Message) -> Result<()> {
        let run_id = ctx.start_run();
        let mut reply = format!("You said: {}", message.content);
        if !message.elements.is_empty() {
            let names: Vec<&str> = message.elements.iter().map(|e| e.name.as_str()).collect();
            reply.push_str(&format!("\n\nReceived files: {}", names.join(", ")));
        }
        tracing::debug!(run_id = %run_id, "echoing message");
        ctx.send_message(&Message::assistant(reply)).await?;
        ctx.end_run();
        Ok(())
    }
}

fn load_config(path: Option<PathBuf>) -> Result<BridgeConfig> {
    let loaded = match path {
        Some(path) => BridgeConfig::load_from(&path),
        None => BridgeConfig::load(),
    };
    loaded.context("failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("warning: failed to read .env: {e}");
        }
    }

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { config, bind } => {
            let mut config = load_config(config)?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            serve(config).await
        }
        Commands::CheckConfig { config } => {
            logging::init_cli("warn");
            let config = load_config(config)?;
            println!("{config:#?}");
            println!(
                "inbound authentication: {}",
                if config.auth_required() {
                    "required"
                } else {
                    "disabled (dev mode)"
                }
            );
            Ok(())
        }
    }
}

async fn serve(config: BridgeConfig) -> Result<()> {
    let _guard = match &config.logging.dir {
        Some(dir) => Some(logging::init_production(dir, &config.logging.level)?),
        None => {
            logging::init_cli(&config.logging.level);
            None
        }
    };

    let auth = &config.auth;
    let tokens = match (&auth.client_id, &auth.client_secret) {
        (Some(client_id), Some(secret)) => {
            let flow = MsalClient::new(
                client_id.clone(),
                secret.clone(),
                auth.tenant_id.as_deref(),
                auth.authority.as_deref(),
            );
            info!(token_url = flow.token_url(), "outbound channel authentication enabled");
            Some(Arc::new(TokenProvider::new(Arc::new(flow))))
        }
        (Some(_), None) => {
            warn!("client id configured without a client secret, outbound calls are unauthenticated");
            None
        }
        _ => None,
    };

    let authenticator = match &auth.client_id {
        Some(client_id) => {
            let key_sets = auth.jwks_urls.iter().cloned().map(JwksCache::new).collect();
            InboundAuthenticator::required(JwtTokenValidator::new(
                client_id.clone(),
                auth.effective_issuers(),
                key_sets,
            ))
        }
        None => {
            warn!("no client id configured, inbound requests are not authenticated");
            InboundAuthenticator::open()
        }
    };

    let factory = Arc::new(RestClientFactory::new(tokens, auth.channel_scope.clone()));
    let adapter = Arc::new(CloudAdapter::new(authenticator, factory));

    let downloader = AttachmentDownloader::new(
        Duration::from_secs(config.downloads.connect_timeout_secs),
        Duration::from_secs(config.downloads.request_timeout_secs),
    );
    let bot = Arc::new(MsAgentsBot::new(
        Arc::new(EchoHooks),
        None,
        downloader,
        config.storage.files_dir.clone(),
    ));

    server::serve(
        &config.server.bind,
        &config.server.messages_path,
        AppState::new(adapter, bot),
    )
    .await
}
