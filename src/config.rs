use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::platform::telegram::parse_recipient;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Default destinations for `POST /`. Numeric ids or `@channel` names.
    #[serde(default)]
    pub chat_ids: Vec<String>,
    /// Override for the Bot API base URL (self-hosted Bot API server, tests).
    #[serde(default)]
    pub api_url: Option<String>,
    /// Call getMe at startup and refuse to start on a rejected token.
    #[serde(default = "default_verify_token")]
    pub verify_token: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProjectConfig {
    #[serde(default = "default_project_name")]
    pub name: String,
    #[serde(default = "default_source_url")]
    pub source_url: String,
    #[serde(default = "default_support_url")]
    pub support_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable base URL, used when telling users which URL to
    /// paste into GitHub. Discovered at startup when unset.
    #[serde(default)]
    pub public_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WebhookConfig {
    /// Shared secret for X-Hub-Signature-256. Unsigned requests are accepted when unset.
    #[serde(default)]
    pub secret: Option<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            source_url: default_source_url(),
            support_url: default_support_url(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

fn default_verify_token() -> bool {
    true
}

fn default_project_name() -> String {
    "GitGram".to_string()
}

fn default_source_url() -> String {
    "https://github.com/MadeByThePinsHub/GitGram".to_string()
}

fn default_support_url() -> String {
    "https://t.me/GitGramChat".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Treat unset and empty variables the same way.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Build the config from environment variables for hosted deployments
    /// (Heroku, Render, Gitpod). `lookup` is usually `|k| std::env::var(k).ok()`.
    pub fn from_env<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));

        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("PORT is not a valid port number: {}", raw))?,
            None => default_port(),
        };

        let chat_ids = get("CHAT_ID")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let config = Config {
            telegram: TelegramConfig {
                bot_token: get("BOT_TOKEN").unwrap_or_default(),
                chat_ids,
                api_url: get("TELEGRAM_API_URL"),
                verify_token: default_verify_token(),
            },
            project: ProjectConfig {
                name: get("PROJECT_NAME").unwrap_or_else(default_project_name),
                source_url: get("GIT_REPO_URL").unwrap_or_else(default_source_url),
                support_url: get("SUPPORT_URL").unwrap_or_else(default_support_url),
            },
            server: ServerConfig {
                host: default_host(),
                port,
                public_url: get("APP_URL"),
            },
            webhook: WebhookConfig {
                secret: get("WEBHOOK_SECRET"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configs that could never deliver a message.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("telegram.bot_token (BOT_TOKEN) is not set");
        }
        if self.server.port == 0 {
            anyhow::bail!("server.port must not be 0");
        }
        if self.telegram.chat_ids.iter().any(|id| id.trim().is_empty()) {
            anyhow::bail!("telegram.chat_ids contains an empty chat id");
        }
        for id in &self.telegram.chat_ids {
            parse_recipient(id).context("telegram.chat_ids contains an invalid chat id")?;
        }
        Ok(())
    }

    /// Shared secret for signature checks, ignoring blank values.
    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook
            .secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
