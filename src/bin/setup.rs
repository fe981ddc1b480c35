//! GitGram setup wizard.
//!
//! Asks for the bot token, default chats and project details on the terminal
//! and writes `config.toml` to the project root (`GITGRAM_ROOT`, or the
//! current directory).

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::PathBuf;

struct ConfigParams<'a> {
    bot_token: &'a str,
    chat_ids: &'a str,
    project_name: &'a str,
    port: u16,
    public_url: &'a str,
    secret: &'a str,
}

/// Quote a value as a TOML basic string.
fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_owned()).to_string()
}

/// Produces a valid config.toml string. Extracted so it can be unit-tested.
fn format_config(p: &ConfigParams<'_>) -> String {
    let ids: Vec<String> = p
        .chat_ids
        .split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(toml_string)
        .collect();
    let ids_str = ids.join(", ");

    let public_url_line = if p.public_url.is_empty() {
        "# public_url = \"https://gitgram.example.com\"".to_owned()
    } else {
        format!("public_url = {}", toml_string(p.public_url))
    };

    let secret_line = if p.secret.is_empty() {
        "# secret = \"same value as the GitHub webhook secret\"".to_owned()
    } else {
        format!("secret = {}", toml_string(p.secret))
    };

    let bot_token = toml_string(p.bot_token);
    let project_name = toml_string(p.project_name);
    let port = p.port;

    format!(
        r#"[telegram]
bot_token = {bot_token}
chat_ids = [{ids_str}]

[project]
name = {project_name}

[server]
host = "0.0.0.0"
port = {port}
{public_url_line}

[webhook]
{secret_line}
"#
    )
}

/// Parse a listen port, refusing 0.
fn parse_port(raw: &str) -> Result<u16> {
    let port: u16 = raw
        .parse()
        .with_context(|| format!("Not a valid port: {raw}"))?;
    if port == 0 {
        anyhow::bail!("Port must be between 1 and 65535");
    }
    Ok(port)
}

fn main() -> Result<()> {
    let project_root =
        PathBuf::from(std::env::var("GITGRAM_ROOT").unwrap_or_else(|_| ".".to_string()));

    println!("=== GitGram Setup ===\n");

    let read_line = |prompt: &str| -> Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut buf = String::new();
        io::stdin().read_line(&mut buf)?;
        Ok(buf.trim().to_owned())
    };

    let or_default = |s: String, default: &str| {
        if s.is_empty() {
            default.to_owned()
        } else {
            s
        }
    };

    let bot_token = read_line("Telegram bot token (from @BotFather): ")?;
    if bot_token.is_empty() {
        anyhow::bail!("A bot token is required");
    }
    let chat_ids = read_line("Default chat ids (comma-separated, optional): ")?;
    let project_name = or_default(read_line("Project name [GitGram]: ")?, "GitGram");
    let port = or_default(read_line("Listen port [8080]: ")?, "8080");
    let port = parse_port(&port)?;
    let public_url = read_line("Public URL (optional, e.g. https://gitgram.example.com): ")?;
    let secret = read_line("Webhook secret (optional): ")?;

    let config = format_config(&ConfigParams {
        bot_token: &bot_token,
        chat_ids: &chat_ids,
        project_name: &project_name,
        port,
        public_url: &public_url,
        secret: &secret,
    });

    let config_path = project_root.join("config.toml");
    std::fs::write(&config_path, &config)
        .with_context(|| format!("Could not write {}", config_path.display()))?;

    println!("\n✓  config.toml saved to {}", config_path.display());
    println!("   Run the relay with:  cargo run");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(bot_token: &str, chat_ids: &str, public_url: &str, secret: &str) -> String {
        format_config(&ConfigParams {
            bot_token,
            chat_ids,
            project_name: "Widgets",
            port: 8080,
            public_url,
            secret,
        })
    }

    #[test]
    fn test_telegram_section_present() {
        let out = cfg("123:abc", "-1001", "", "");
        assert!(out.contains("[telegram]"));
        assert!(out.contains(r#"bot_token = "123:abc""#));
        assert!(out.contains(r#"chat_ids = ["-1001"]"#));
    }

    #[test]
    fn test_multiple_chat_ids() {
        let out = cfg("t", "-1001, @news  -1002", "", "");
        assert!(out.contains(r#"chat_ids = ["-1001", "@news", "-1002"]"#));
    }

    #[test]
    fn test_optional_lines_commented_when_empty() {
        let out = cfg("t", "", "", "");
        assert!(out.contains("chat_ids = []"));
        assert!(out.contains("# public_url ="));
        assert!(out.contains("# secret ="));
    }

    #[test]
    fn test_optional_lines_set() {
        let out = cfg("t", "", "https://hooks.example.com", "hush");
        assert!(out.contains(r#"public_url = "https://hooks.example.com""#));
        assert!(out.contains(r#"secret = "hush""#));
    }

    #[test]
    fn test_values_are_quoted() {
        let out = cfg("t", "", "", r#"a"b\c"#);
        let parsed: toml::Value = toml::from_str(&out).unwrap();
        assert_eq!(parsed["webhook"]["secret"].as_str(), Some(r#"a"b\c"#));
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("8080").unwrap(), 8080);
        assert!(parse_port("0").is_err());
        assert!(parse_port("65536").is_err());
        assert!(parse_port("http").is_err());
    }

    #[test]
    fn test_output_is_valid_toml() {
        let out = cfg("123:abc", "-1001", "https://hooks.example.com", "hush");
        let parsed: toml::Value = toml::from_str(&out).unwrap();
        assert_eq!(parsed["project"]["name"].as_str(), Some("Widgets"));
        assert_eq!(parsed["server"]["port"].as_integer(), Some(8080));
    }
}
