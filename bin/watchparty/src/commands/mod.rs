pub mod parse;
pub mod run;
pub mod status;

use clap::Args;
use std::path::PathBuf;
use watchparty_core::{Config, Paths};

/// Options that override the config file for one invocation.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Config file (default: ~/.watchparty/config.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Voice/chat room address (overrides VC_URL)
    #[arg(long)]
    pub vc_url: Option<String>,

    /// Name the bot answers to (overrides BOT_NAME)
    #[arg(long)]
    pub bot_name: Option<String>,
}

/// File, then environment, then command line.
pub fn load_config(paths: &Paths, overrides: &Overrides) -> anyhow::Result<Config> {
    let mut config = match &overrides.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(paths)?,
    };
    config.apply_env_overrides();
    if let Some(url) = overrides.vc_url.as_deref().filter(|s| !s.trim().is_empty()) {
        config.session.vc_url = url.trim().to_string();
    }
    if let Some(name) = overrides.bot_name.as_deref().filter(|s| !s.trim().is_empty()) {
        config.session.bot_name = name.trim().to_string();
    }
    Ok(config)
}
