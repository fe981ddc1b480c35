use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use teloxide::utils::html::escape;
use tracing::{debug, info};

use crate::config::Config;
use crate::platform::telegram::no_link_preview;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "what this bot does")]
    Start,
    #[command(description = "show this help")]
    Help,
    #[command(description = "get the webhook URL for this chat")]
    Connect,
    #[command(description = "get support links")]
    Support,
    #[command(description = "show the source repository")]
    Source,
}

/// What the command handlers need to answer; built once at startup.
pub struct CommandContext {
    pub project_name: String,
    pub public_url: String,
    pub source_url: String,
    pub support_url: String,
}

impl CommandContext {
    pub fn new(config: &Config, public_url: &str) -> Self {
        Self {
            project_name: config.project.name.clone(),
            public_url: public_url.to_string(),
            source_url: config.project.source_url.clone(),
            support_url: config.project.support_url.clone(),
        }
    }
}

/// Poll Telegram for commands until the process exits.
pub async fn run(bot: Bot, ctx: Arc<CommandContext>) {
    info!("Starting Telegram command bot...");

    let handler = Update::filter_message()
        .filter_command::<Command>()
        .endpoint(handle_command);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx])
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("bot"))
        .build()
        .dispatch()
        .await;
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    ctx: Arc<CommandContext>,
) -> ResponseResult<()> {
    info!("Command {:?} in chat {}", cmd, msg.chat.id);

    bot.send_message(msg.chat.id, reply_for(&cmd, &ctx, msg.chat.id))
        .parse_mode(ParseMode::Html)
        .link_preview_options(no_link_preview())
        .await?;

    Ok(())
}

/// HTML reply for `cmd` sent in `chat`.
pub fn reply_for(cmd: &Command, ctx: &CommandContext, chat: ChatId) -> String {
    match cmd {
        Command::Start => format!(
            "This is the updates watcher for <b>{}</b>. \
             I notify chats about Git repository updates via webhooks.\n\n\
             Send /connect to get a webhook URL for this chat, or /help for more.",
            escape(&ctx.project_name)
        ),
        Command::Help => escape(&Command::descriptions().to_string()),
        Command::Connect => format!(
            "Add this URL to your GitHub repository webhooks \
             (Settings → Webhooks, content type <code>application/json</code>):\n\n\
             <code>{}/{}</code>",
            escape(ctx.public_url.trim_end_matches('/')),
            chat.0
        ),
        Command::Support => format!("Support: {}", escape(&ctx.support_url)),
        Command::Source => format!("Source: {}", escape(&ctx.source_url)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CommandContext {
        let config = Config::parse(
            r#"
[telegram]
bot_token = "123:abc"

[project]
name = "Widgets & Co"
"#,
        )
        .unwrap();
        CommandContext::new(&config, "https://hooks.example.com/")
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/start", "gitgrambot").unwrap(), Command::Start);
        assert_eq!(
            Command::parse("/connect@gitgrambot", "gitgrambot").unwrap(),
            Command::Connect
        );
        assert!(Command::parse("/unknown", "gitgrambot").is_err());
    }

    #[test]
    fn test_start_names_project() {
        let reply = reply_for(&Command::Start, &ctx(), ChatId(1));
        assert!(reply.contains("<b>Widgets &amp; Co</b>"));
    }

    #[test]
    fn test_connect_gives_chat_url() {
        let reply = reply_for(&Command::Connect, &ctx(), ChatId(-100123));
        assert!(reply.contains("<code>https://hooks.example.com/-100123</code>"));
    }

    #[test]
    fn test_help_lists_commands() {
        let reply = reply_for(&Command::Help, &ctx(), ChatId(1));
        for cmd in ["/start", "/help", "/connect", "/support", "/source"] {
            assert!(reply.contains(cmd), "missing {cmd}");
        }
    }

    #[test]
    fn test_support_and_source_links() {
        let ctx = ctx();
        assert!(reply_for(&Command::Support, &ctx, ChatId(1)).contains("https://t.me/GitGramChat"));
        assert!(reply_for(&Command::Source, &ctx, ChatId(1))
            .contains("https://github.com/MadeByThePinsHub/GitGram"));
    }
}
