pub mod signature;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use teloxide::utils::html::escape;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::github::{format, EventKind};
use crate::heartbeat::RelayStats;
use crate::platform::telegram::parse_recipient;
use crate::platform::MessageSink;

pub const EVENT_HEADER: &str = "x-github-event";
pub const DELIVERY_HEADER: &str = "x-github-delivery";

/// Shared state for the webhook handlers
pub struct AppState {
    pub config: Config,
    /// Base URL users should paste into GitHub, without a trailing slash.
    pub public_url: String,
    pub bot_username: String,
    pub sink: Arc<dyn MessageSink>,
    pub stats: Arc<RelayStats>,
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("missing X-Hub-Signature-256 header")]
    MissingSignature,
    #[error("webhook signature does not match")]
    BadSignature,
    #[error("missing X-GitHub-Event header")]
    MissingEvent,
    #[error("invalid JSON payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("no destination chat configured; use /<chat_id> as the webhook path")]
    NoDestination,
    #[error("invalid chat id {0:?}; expected a numeric id or @channel")]
    InvalidChat(String),
    #[error("delivery failed for {failed} of {total} chat(s)")]
    Delivery { failed: usize, total: usize },
}

impl WebhookError {
    fn status(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature | WebhookError::BadSignature => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::MissingEvent
            | WebhookError::InvalidPayload(_)
            | WebhookError::NoDestination
            | WebhookError::InvalidChat(_) => StatusCode::BAD_REQUEST,
            WebhookError::Delivery { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "ok": false, "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(landing_page).post(relay_to_default_chats))
        .route("/health", get(health))
        .route("/{chat_id}", get(setup_instructions).post(relay_to_chat))
        .with_state(state)
}

/// Serve the webhook endpoints until Ctrl-C.
pub async fn serve(state: Arc<AppState>, listener: TcpListener) -> Result<()> {
    let addr = listener
        .local_addr()
        .context("Failed to read listener address")?;
    info!("Webhook server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await
        .context("Webhook server error")?;

    Ok(())
}

// ── Handlers ───────────────────────────────────────────────────────────────────

async fn landing_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let bot = escape(&state.bot_username);
    let project = escape(&state.config.project.name);
    let source = escape(&state.config.project.source_url);
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>GitGram - {bot}</title>
    <style>
        body {{ background: #0d0d0d; color: #00ff99; font-family: 'Courier New', monospace;
               display: flex; flex-direction: column; justify-content: center;
               align-items: center; height: 100vh; margin: 0; text-align: center; }}
        p {{ color: #00ffff; max-width: 600px; }}
        a {{ color: #ff0099; text-decoration: none; }}
    </style>
</head>
<body>
    <h1>@{bot}</h1>
    <p>Relays Git repository updates for {project} to Telegram via webhooks.</p>
    <p>Source code: <a href="{source}" target="_blank">{source}</a></p>
</body>
</html>
"#
    ))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "ok": true, "stats": state.stats.snapshot() }))
}

async fn setup_instructions(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Html<String> {
    Html(format!(
        "<b>Add this URL:</b> {}/{} to your GitHub webhook",
        escape(&state.public_url),
        escape(&chat_id)
    ))
}

async fn relay_to_default_chats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, WebhookError> {
    let chats = state.config.telegram.chat_ids.clone();
    relay(&state, &headers, &body, &chats).await
}

async fn relay_to_chat(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, WebhookError> {
    relay(&state, &headers, &body, std::slice::from_ref(&chat_id)).await
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Verify, parse, render and deliver one webhook to `chats`.
async fn relay(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    chats: &[String],
) -> Result<Json<Value>, WebhookError> {
    if let Some(secret) = state.config.webhook_secret() {
        let sig =
            header(headers, signature::SIGNATURE_HEADER).ok_or(WebhookError::MissingSignature)?;
        if !signature::verify(secret.as_bytes(), body, sig) {
            warn!("Rejected webhook with a bad signature");
            return Err(WebhookError::BadSignature);
        }
    }

    let event = header(headers, EVENT_HEADER).ok_or(WebhookError::MissingEvent)?;
    let delivery = header(headers, DELIVERY_HEADER).unwrap_or("-");

    let payload: Value = serde_json::from_slice(body)?;
    state.stats.record_received();

    let Some(kind) = EventKind::from_header(event) else {
        state.stats.record_ignored();
        info!(event, delivery, "Ignoring unsupported GitHub event");
        return Ok(Json(json!({ "ok": true, "ignored": true })));
    };

    if chats.is_empty() {
        return Err(WebhookError::NoDestination);
    }
    if let Some(bad) = chats.iter().find(|c| parse_recipient(c).is_err()) {
        warn!(event = %kind, delivery, "Rejected webhook for invalid chat {:?}", bad);
        return Err(WebhookError::InvalidChat(bad.clone()));
    }

    let text = format::render(kind, payload, &state.config.project.name);
    debug!(event = %kind, delivery, "Rendered {} chars", text.len());

    let mut failed = 0;
    for chat in chats {
        match state.sink.send(chat, &text).await {
            Ok(()) => {
                state.stats.record_delivered();
                info!(event = %kind, delivery, "Delivered to chat {}", chat);
            }
            Err(e) => {
                failed += 1;
                state.stats.record_failed();
                error!(event = %kind, delivery, "Failed to deliver to chat {}: {:#}", chat, e);
            }
        }
    }

    if failed > 0 {
        return Err(WebhookError::Delivery {
            failed,
            total: chats.len(),
        });
    }

    Ok(Json(json!({
        "ok": true,
        "event": kind.as_str(),
        "delivered": chats.len()
    })))
}
