use std::path::PathBuf;
use watchparty_agent::parse_command;
use watchparty_core::Paths;

use super::{load_config, Overrides};

pub fn run(message: &str, bot_name: Option<String>, config: Option<PathBuf>) -> anyhow::Result<()> {
    let overrides = Overrides {
        config,
        vc_url: None,
        bot_name,
    };
    let config = load_config(&Paths::new(), &overrides)?;
    let bot_name = config.session.bot_name.trim();
    if bot_name.is_empty() {
        anyhow::bail!("bot name is missing: pass --bot-name or set BOT_NAME");
    }

    let command = parse_command(message, bot_name);
    let report = serde_json::json!({
        "message": message,
        "botName": bot_name,
        "addressed": command.is_some(),
        "command": command,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
