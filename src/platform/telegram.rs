use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{LinkPreviewOptions, ParseMode, Recipient};
use teloxide::RequestError;
use tracing::{debug, warn};

use crate::config::TelegramConfig;
use crate::platform::MessageSink;

/// Chunk size for outgoing messages; Telegram rejects anything over 4096.
pub const MESSAGE_CHUNK_LEN: usize = 4000;

/// Split Telegram HTML for the 4096 char limit.
///
/// `max_len` bounds the bytes of source text per chunk. Cuts prefer line
/// breaks, then spaces, and never land inside a tag or an `&...;` entity.
/// Elements still open at a cut are closed at the end of the chunk and
/// reopened at the start of the next one.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut open: Vec<(String, String)> = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let reopen: String = open.iter().map(|(_, tag)| tag.as_str()).collect();

        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            safe_cut(text, start, end)
        } else {
            end
        };

        let piece = &text[start..actual_end];
        track_open_tags(piece, &mut open);
        let close: String = open
            .iter()
            .rev()
            .map(|(name, _)| format!("</{}>", name))
            .collect();

        chunks.push(format!("{}{}{}", reopen, piece, close));
        start = actual_end;
    }

    chunks
}

/// Last position in `text[start..end]` that is outside any tag or entity,
/// preferring the end of a line, then the end of a word.
fn safe_cut(text: &str, start: usize, end: usize) -> usize {
    let mut in_tag = false;
    let mut in_entity = false;
    let mut after_newline = None;
    let mut after_space = None;
    let mut any = None;

    for (i, c) in text[start..end].char_indices() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            '&' if !in_tag => in_entity = true,
            ';' if in_entity => in_entity = false,
            c if in_entity && c.is_whitespace() => in_entity = false,
            _ => {}
        }
        if in_tag || in_entity {
            continue;
        }
        let pos = start + i + c.len_utf8();
        any = Some(pos);
        match c {
            '\n' => after_newline = Some(pos),
            ' ' => after_space = Some(pos),
            _ => {}
        }
    }

    after_newline.or(after_space).or(any).unwrap_or(end)
}

/// Update the stack of open elements with the tags found in `html`.
fn track_open_tags(html: &str, open: &mut Vec<(String, String)>) {
    let mut rest = html;
    while let Some(lt) = rest.find('<') {
        let Some(gt) = rest[lt..].find('>') else {
            break;
        };
        let tag = &rest[lt..lt + gt + 1];
        let inner = &tag[1..tag.len() - 1];
        if let Some(name) = inner.strip_prefix('/') {
            let name = name.trim();
            if let Some(pos) = open.iter().rposition(|(n, _)| n == name) {
                open.remove(pos);
            }
        } else {
            let name = inner.split_whitespace().next().unwrap_or("");
            if !name.is_empty() {
                open.push((name.to_string(), tag.to_string()));
            }
        }
        rest = &rest[lt + gt + 1..];
    }
}

/// Create a teloxide bot, honouring an API URL override.
pub fn build_bot(config: &TelegramConfig) -> Result<Bot> {
    let bot = Bot::new(&config.bot_token);
    match config.api_url.as_deref() {
        Some(raw) => {
            let url = reqwest::Url::parse(raw)
                .with_context(|| format!("Invalid Telegram API URL: {}", raw))?;
            Ok(bot.set_api_url(url))
        }
        None => Ok(bot),
    }
}

/// `@name` targets a public channel, anything else must be a numeric chat id.
pub fn parse_recipient(chat: &str) -> Result<Recipient> {
    let chat = chat.trim();
    if chat.starts_with('@') && chat.len() > 1 {
        return Ok(Recipient::ChannelUsername(chat.to_string()));
    }
    chat.parse::<i64>()
        .map(|id| Recipient::Id(ChatId(id)))
        .with_context(|| format!("Invalid chat id: {:?}", chat))
}

pub(crate) fn no_link_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

/// Delivers rendered events through the Bot API `sendMessage` call.
pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Check the token with getMe and return the bot's username.
    ///
    /// Fails only when Telegram answers and rejects the token. When Telegram
    /// cannot be reached the error is logged and `None` is returned.
    pub async fn verify_token(&self) -> Result<Option<String>> {
        match self.bot.get_me().await {
            Ok(me) => Ok(Some(
                me.user
                    .username
                    .clone()
                    .unwrap_or_else(|| me.user.first_name.clone()),
            )),
            Err(e @ (RequestError::Network(_) | RequestError::Io(_))) => {
                warn!("Could not reach Telegram to check the bot token: {}", e);
                Ok(None)
            }
            Err(e) => Err(e).context("Telegram rejected the bot token (getMe failed)"),
        }
    }
}

#[async_trait]
impl MessageSink for TelegramSender {
    async fn send(&self, chat: &str, text: &str) -> Result<()> {
        let recipient = parse_recipient(chat)?;
        let chunks = split_message(text, MESSAGE_CHUNK_LEN);
        debug!("Sending {} chunk(s) to chat {}", chunks.len(), chat);

        for chunk in chunks {
            self.bot
                .send_message(recipient.clone(), chunk)
                .parse_mode(ParseMode::Html)
                .link_preview_options(no_link_preview())
                .await
                .with_context(|| format!("Failed to send message to chat {}", chat))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BOT_TOKEN: &str = "123456:test_token";

    const SEND_OK_BODY: &str = r#"{
        "ok": true,
        "result": {
            "message_id": 1,
            "date": 1706529600,
            "chat": {"id": -100123, "type": "private"},
            "from": {"id": 123456, "is_bot": true, "first_name": "GitGram", "username": "gitgrambot"},
            "text": "ok"
        }
    }"#;

    fn sender_for(server: &mockito::ServerGuard) -> TelegramSender {
        let config = TelegramConfig {
            bot_token: TEST_BOT_TOKEN.to_string(),
            chat_ids: vec![],
            api_url: Some(server.url()),
            verify_token: true,
        };
        TelegramSender::new(build_bot(&config).unwrap())
    }

    fn send_path() -> String {
        format!("/bot{}/sendMessage", TEST_BOT_TOKEN)
    }

    #[test]
    fn test_split_short_message() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
    }

    #[test]
    fn test_split_prefers_newlines() {
        let chunks = split_message("first line\nsecond line", 15);
        assert_eq!(chunks, vec!["first line\n", "second line"]);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let text = "ü".repeat(10);
        let chunks = split_message(&text, 5);
        assert!(chunks.iter().all(|c| c.len() <= 5));
        assert_eq!(chunks.concat(), text);
    }

    /// Every entity is complete and every tag opened in the chunk is closed.
    fn assert_html_intact(chunk: &str) {
        for (i, _) in chunk.match_indices('&') {
            let semi = chunk[i..].find(';');
            assert!(
                matches!(semi, Some(n) if n <= 8),
                "entity cut at byte {} of chunk ending {:?}",
                i,
                &chunk[chunk.len().saturating_sub(20)..]
            );
        }
        assert_eq!(chunk.matches('<').count(), chunk.matches('>').count());
        let mut open = Vec::new();
        track_open_tags(chunk, &mut open);
        assert!(open.is_empty(), "unclosed tags: {:?}", open);
    }

    #[test]
    fn test_split_never_cuts_entities() {
        let text = format!("<i>{}</i>", "ab&lt;".repeat(2000));
        let chunks = split_message(&text, MESSAGE_CHUNK_LEN);
        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.starts_with("<i>"));
            assert!(chunk.ends_with("</i>"));
            assert_html_intact(chunk);
        }
        let joined: String = chunks
            .iter()
            .map(|c| &c[3..c.len() - 4])
            .collect();
        assert_eq!(format!("<i>{}</i>", joined), text);
    }

    #[test]
    fn test_split_never_cuts_tags() {
        let line = "<a href=\"https://github.com/acme/widgets/commit/0123456\">0123456</a>";
        let text = line.repeat(200);
        let chunks = split_message(&text, 1000);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 1000 + 2 * line.len());
            assert_html_intact(chunk);
        }
    }

    #[test]
    fn test_rendered_push_splits_cleanly() {
        use crate::github::{format, EventKind};

        let commits: Vec<serde_json::Value> = (0..10)
            .map(|i| {
                serde_json::json!({
                    "id": format!("{:040}", i),
                    "message": "ab<".repeat(2000),
                    "url": "https://github.com/acme/widgets/commit/0"
                })
            })
            .collect();
        let payload = serde_json::json!({
            "ref": "refs/heads/main",
            "commits": commits,
            "repository": { "full_name": "acme/widgets" }
        });
        let text = format::render(EventKind::Push, payload, "Widgets");

        for chunk in split_message(&text, MESSAGE_CHUNK_LEN) {
            assert_html_intact(&chunk);
        }
        for chunk in split_message(&text, 500) {
            assert_html_intact(&chunk);
        }
    }

    #[test]
    fn test_parse_recipient() {
        assert!(matches!(
            parse_recipient("-100123").unwrap(),
            Recipient::Id(ChatId(-100123))
        ));
        assert!(matches!(
            parse_recipient(" @news ").unwrap(),
            Recipient::ChannelUsername(ref name) if name == "@news"
        ));
        assert!(parse_recipient("news").is_err());
        assert!(parse_recipient("@").is_err());
    }

    #[test]
    fn test_build_bot_rejects_bad_api_url() {
        let config = TelegramConfig {
            bot_token: TEST_BOT_TOKEN.to_string(),
            chat_ids: vec![],
            api_url: Some("not a url".to_string()),
            verify_token: true,
        };
        assert!(build_bot(&config).is_err());
    }

    #[tokio::test]
    async fn test_send_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", send_path().as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SEND_OK_BODY)
            .expect(1)
            .create_async()
            .await;

        let sender = sender_for(&server);
        sender.send("-100123", "<b>hi</b>").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_long_message_sent_in_chunks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", send_path().as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SEND_OK_BODY)
            .expect(2)
            .create_async()
            .await;

        let sender = sender_for(&server);
        let text = "line\n".repeat(MESSAGE_CHUNK_LEN / 5 + 10);
        sender.send("-100123", &text).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_failure_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", send_path().as_str())
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#)
            .create_async()
            .await;

        let sender = sender_for(&server);
        let err = sender.send("-100123", "hello").await.unwrap_err();
        assert!(err.to_string().contains("-100123"));
    }

    #[tokio::test]
    async fn test_invalid_chat_is_rejected_before_sending() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", send_path().as_str())
            .expect(0)
            .create_async()
            .await;

        let sender = sender_for(&server);
        assert!(sender.send("not-a-chat", "hello").await.is_err());

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_verify_token() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", format!("/bot{}/getMe", TEST_BOT_TOKEN).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                "ok": true,
                "result": {
                    "id": 123456,
                    "is_bot": true,
                    "first_name": "GitGram",
                    "username": "gitgrambot",
                    "can_join_groups": true,
                    "can_read_all_group_messages": false,
                    "supports_inline_queries": false,
                    "can_connect_to_business": false,
                    "has_main_web_app": false
                }
            }"#,
            )
            .create_async()
            .await;

        let sender = sender_for(&server);
        assert_eq!(
            sender.verify_token().await.unwrap().as_deref(),
            Some("gitgrambot")
        );
    }

    #[tokio::test]
    async fn test_verify_token_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", format!("/bot{}/getMe", TEST_BOT_TOKEN).as_str())
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#)
            .create_async()
            .await;

        let sender = sender_for(&server);
        assert!(sender.verify_token().await.is_err());
    }

    #[tokio::test]
    async fn test_verify_token_unreachable_is_not_fatal() {
        let config = TelegramConfig {
            bot_token: TEST_BOT_TOKEN.to_string(),
            chat_ids: vec![],
            api_url: Some("http://127.0.0.1:1".to_string()),
            verify_token: true,
        };
        let sender = TelegramSender::new(build_bot(&config).unwrap());
        assert_eq!(sender.verify_token().await.unwrap(), None);
    }
}
