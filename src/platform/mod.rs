pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

/// Somewhere a rendered event can be delivered.
///
/// `chat` is the platform's destination identifier as configured (for
/// Telegram a numeric chat id or an `@channel` username). `text` is HTML.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, chat: &str, text: &str) -> Result<()>;
}
