//! Feed message classification.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// `play <query> <episode>`; the query is greedy so it may itself contain digits.
static PLAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)play\s+(.+)\s+(\d+)").expect("valid play pattern"));

/// A normalized command addressed to the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Command {
    Play { query: String, episode: u32 },
    Pause,
    Resume,
    Stop,
    Unknown,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Play { .. } => "play",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Stop => "stop",
            Command::Unknown => "unknown",
        }
    }
}

/// The token that marks a message as addressed to `bot_name`.
pub fn mention_token(bot_name: &str) -> String {
    format!("@{}", bot_name.trim().to_lowercase())
}

pub fn mentions(message: &str, bot_name: &str) -> bool {
    message.to_lowercase().contains(&mention_token(bot_name))
}

/// Classify `message`. `None` when it does not mention the bot.
pub fn parse_command(message: &str, bot_name: &str) -> Option<Command> {
    if !mentions(message, bot_name) {
        return None;
    }
    Some(classify(message))
}

/// Classify a message already known to address the bot. First match wins.
pub fn classify(message: &str) -> Command {
    let lower = message.to_lowercase();

    if lower.contains("play") {
        return parse_play(message).unwrap_or(Command::Unknown);
    }
    if lower.contains("pause") {
        return Command::Pause;
    }
    if lower.contains("start") || lower.contains("resume") {
        return Command::Resume;
    }
    if lower.contains("stop") || lower.contains("disconnect") {
        return Command::Stop;
    }
    Command::Unknown
}

fn parse_play(message: &str) -> Option<Command> {
    let caps = PLAY_RE.captures(message)?;
    let query = caps.get(1)?.as_str().trim();
    let episode: u32 = caps.get(2)?.as_str().parse().ok()?;
    if query.is_empty() || episode == 0 {
        return None;
    }
    Some(Command::Play {
        query: query.to_string(),
        episode,
    })
}
