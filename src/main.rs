mod bot;
mod config;
mod github;
mod heartbeat;
mod platform;
mod webhook;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::CommandContext;
use crate::config::Config;
use crate::heartbeat::RelayStats;
use crate::platform::telegram::{self, TelegramSender};
use crate::webhook::AppState;

const IP_LOOKUP_URL: &str = "https://api.ipify.org";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gitgram=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;

    info!("Configuration loaded successfully");
    info!("  Project: {}", config.project.name);
    info!("  Listen: {}", config.listen_addr());
    info!("  Default chats: {:?}", config.telegram.chat_ids);
    info!("  Signed webhooks: {}", config.webhook_secret().is_some());

    let bot = telegram::build_bot(&config.telegram)?;
    let sender = TelegramSender::new(bot.clone());

    let verified = if config.telegram.verify_token {
        sender.verify_token().await?
    } else {
        None
    };
    let bot_username = match verified {
        Some(username) => {
            info!("Logged in as @{}", username);
            username
        }
        None => "GitGramBot".to_string(),
    };

    let public_url = resolve_public_url(&config).await;
    info!("Webhook URL: {}/<chat_id>", public_url);

    let stats = Arc::new(RelayStats::default());
    let _heartbeat = heartbeat::start(stats.clone()).await?;

    // The command bot is a convenience; the relay keeps running without it.
    let ctx = Arc::new(CommandContext::new(&config, &public_url));
    tokio::spawn(bot::run(bot, ctx));

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let state = Arc::new(AppState {
        config,
        public_url,
        bot_username,
        sink: Arc::new(sender),
        stats,
    });

    webhook::serve(state, listener).await?;

    Ok(())
}

/// `ENV` set: environment variables (hosted deployments). Otherwise the TOML
/// file named by the first argument, defaulting to `config.toml`.
fn load_config() -> Result<Config> {
    let env_mode = std::env::var("ENV")
        .map(|v| !v.is_empty())
        .unwrap_or(false);

    if env_mode {
        info!("Loading configuration from environment");
        return Config::from_env(|key| std::env::var(key).ok())
            .context("Invalid configuration in environment");
    }

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))
}

async fn resolve_public_url(config: &Config) -> String {
    if let Some(url) = config.server.public_url.as_deref() {
        return url.trim_end_matches('/').to_string();
    }

    match fetch_public_ip().await {
        Ok(ip) => format!("http://{}:{}", ip, config.server.port),
        Err(e) => {
            warn!("Could not discover public address: {:#}", e);
            "http://<your-server>".to_string()
        }
    }
}

async fn fetch_public_ip() -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")?;

    let ip = client
        .get(IP_LOOKUP_URL)
        .send()
        .await
        .context("Failed to reach IP lookup service")?
        .error_for_status()
        .context("IP lookup service returned an error")?
        .text()
        .await
        .context("Failed to read IP lookup response")?;

    let ip = ip.trim();
    if ip.is_empty() {
        anyhow::bail!("IP lookup service returned an empty response");
    }
    Ok(ip.to_string())
}
