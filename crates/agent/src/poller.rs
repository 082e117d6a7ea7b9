//! Change detection over the chat feed.

use crate::capability::FeedReader;
use crate::command::{parse_command, Command};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct CommandPoller {
    feed: Arc<dyn FeedReader>,
    bot_name: String,
    last_seen: Option<String>,
    /// Set once a feed read has succeeded; until then nothing is treated as new.
    baselined: bool,
}

impl CommandPoller {
    pub fn new(feed: Arc<dyn FeedReader>, bot_name: impl Into<String>) -> Self {
        Self {
            feed,
            bot_name: bot_name.into(),
            last_seen: None,
            baselined: false,
        }
    }

    pub fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }

    #[cfg(test)]
    fn has_baseline(&self) -> bool {
        self.baselined
    }

    /// Record the current last message so history is never replayed.
    /// Call once before the first `poll`. On a failed read the baseline stays
    /// pending and the next successful `poll` takes it instead.
    pub async fn capture_baseline(&mut self) {
        match self.feed.last_message().await {
            Ok(last) => self.set_baseline(last),
            Err(e) => {
                warn!(error = %e, "Could not read feed for baseline, retrying on the next poll");
            }
        }
    }

    fn set_baseline(&mut self, last: Option<String>) {
        info!(has_history = last.is_some(), "Feed baseline captured, waiting for new commands");
        self.last_seen = last;
        self.baselined = true;
    }

    /// Sample the feed once. Returns a command only for a new message that mentions the bot.
    pub async fn poll(&mut self) -> Option<Command> {
        let last = match self.feed.last_message().await {
            Ok(last) => last,
            Err(e) => {
                debug!(error = %e, "Feed read failed, retrying next tick");
                return None;
            }
        };
        if !self.baselined {
            self.set_baseline(last);
            return None;
        }
        let current = last?;

        if self.last_seen.as_deref() == Some(current.as_str()) {
            return None;
        }

        // Recorded even when the message is not for us, so it is never re-read as new.
        let command = parse_command(&current, &self.bot_name);
        if command.is_some() {
            info!(message = %current, "New command message");
        }
        self.last_seen = Some(current);
        command
    }
}
