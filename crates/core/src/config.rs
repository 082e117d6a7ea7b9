use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::paths::Paths;

/// What a `Stop` command does after the playback tab is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StopMode {
    /// Click the voice disconnect control and keep watching the feed.
    #[default]
    Leave,
    /// Close the whole browser and exit.
    Terminate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Address of the voice/chat room. Required.
    #[serde(default)]
    pub vc_url: String,
    /// Display name the bot answers to (`@name`). Required.
    #[serde(default)]
    pub bot_name: String,
    #[serde(default)]
    pub stop_mode: StopMode,
    /// Treat a missing "join" control as "already joined".
    #[serde(default = "default_true")]
    pub assume_joined_when_missing: bool,
    #[serde(default = "default_initial_load_ms")]
    pub initial_load_ms: u64,
    #[serde(default = "default_join_settle_ms")]
    pub join_settle_ms: u64,
    #[serde(default = "default_share_settle_ms")]
    pub share_settle_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_initial_load_ms() -> u64 {
    5000
}

fn default_join_settle_ms() -> u64 {
    2000
}

fn default_share_settle_ms() -> u64 {
    5000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            vc_url: String::new(),
            bot_name: String::new(),
            stop_mode: StopMode::default(),
            assume_joined_when_missing: default_true(),
            initial_load_ms: default_initial_load_ms(),
            join_settle_ms: default_join_settle_ms(),
            share_settle_ms: default_share_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// "chrome" or "edge".
    #[serde(default = "default_engine")]
    pub engine: String,
    /// Explicit browser binary; searched on PATH when unset.
    #[serde(default)]
    pub binary: Option<String>,
    #[serde(default = "default_true")]
    pub headed: bool,
    /// User data directory. Defaults to `~/.watchparty/profile`.
    #[serde(default)]
    pub profile_dir: Option<String>,
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_engine() -> String {
    "chrome".to_string()
}

fn default_navigation_timeout_secs() -> u64 {
    60
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            binary: None,
            headed: default_true(),
            profile_dir: None,
            navigation_timeout_secs: default_navigation_timeout_secs(),
            extra_args: Vec::new(),
        }
    }
}

impl BrowserConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn profile_dir(&self, paths: &Paths) -> PathBuf {
        match &self.profile_dir {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => paths.profile_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    /// Selector matching every message body in the feed, in display order.
    #[serde(default = "default_message_selector")]
    pub message_selector: String,
    /// Commands waiting while a workflow runs.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_message_selector() -> String {
    r#"[class*="messageContent"]"#.to_string()
}

fn default_queue_capacity() -> usize {
    16
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            message_selector: default_message_selector(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(100))
    }
}

/// How to find one clickable control.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlConfig {
    /// Structural marker, tried first.
    #[serde(default)]
    pub selector: Option<String>,
    /// Visible text scanned for over buttons when the selector misses.
    #[serde(default)]
    pub text: Option<String>,
    /// Present when the control's effect is already in place.
    #[serde(default)]
    pub already_marker: Option<String>,
    #[serde(default = "default_control_wait_ms")]
    pub wait_ms: u64,
}

fn default_control_wait_ms() -> u64 {
    5000
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            selector: None,
            text: None,
            already_marker: None,
            wait_ms: default_control_wait_ms(),
        }
    }
}

impl ControlConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiConfig {
    #[serde(default = "default_join_control")]
    pub join: ControlConfig,
    #[serde(default = "default_deafen_control")]
    pub deafen: ControlConfig,
    #[serde(default = "default_chat_control")]
    pub chat: ControlConfig,
    #[serde(default = "default_share_control")]
    pub share: ControlConfig,
    #[serde(default = "default_disconnect_control")]
    pub disconnect: ControlConfig,
}

fn default_join_control() -> ControlConfig {
    ControlConfig {
        selector: None,
        text: Some("Join Voice".to_string()),
        already_marker: Some(r#"button[aria-label="Disconnect"]"#.to_string()),
        wait_ms: 5000,
    }
}

fn default_deafen_control() -> ControlConfig {
    ControlConfig {
        selector: Some(r#"button[aria-label="Deafen"]"#.to_string()),
        text: None,
        already_marker: Some(r#"button[aria-label="Undeafen"]"#.to_string()),
        wait_ms: 3000,
    }
}

fn default_chat_control() -> ControlConfig {
    ControlConfig {
        selector: Some(r#"button[aria-label^="Show Chat"]"#.to_string()),
        text: Some("Show Chat".to_string()),
        already_marker: Some(r#"div[class*="channelTextArea"]"#.to_string()),
        wait_ms: 5000,
    }
}

fn default_share_control() -> ControlConfig {
    ControlConfig {
        selector: Some(r#"button[aria-label*="Share"]"#.to_string()),
        text: None,
        already_marker: Some(r#"button[aria-label*="Stop Streaming"]"#.to_string()),
        wait_ms: 3000,
    }
}

fn default_disconnect_control() -> ControlConfig {
    ControlConfig {
        selector: Some(r#"button[aria-label="Disconnect"]"#.to_string()),
        text: None,
        already_marker: None,
        wait_ms: 5000,
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            join: default_join_control(),
            deafen: default_deafen_control(),
            chat: default_chat_control(),
            share: default_share_control(),
            disconnect: default_disconnect_control(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_base_url")]
    pub base_url: String,
    #[serde(default = "default_search_input")]
    pub search_input: String,
    #[serde(default = "default_first_result")]
    pub first_result: String,
    /// Substring of a canonical content address.
    #[serde(default = "default_content_path_marker")]
    pub content_path_marker: String,
    #[serde(default = "default_type_delay_ms")]
    pub type_delay_ms: u64,
    #[serde(default = "default_result_timeout_secs")]
    pub result_timeout_secs: u64,
    #[serde(default = "default_content_timeout_secs")]
    pub content_timeout_secs: u64,
}

fn default_catalog_base_url() -> String {
    "https://animepahe.si/".to_string()
}

fn default_search_input() -> String {
    r#"input[name="q"]"#.to_string()
}

fn default_first_result() -> String {
    ".search-results a".to_string()
}

fn default_content_path_marker() -> String {
    "/anime/".to_string()
}

fn default_type_delay_ms() -> u64 {
    100
}

fn default_result_timeout_secs() -> u64 {
    10
}

fn default_content_timeout_secs() -> u64 {
    30
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_catalog_base_url(),
            search_input: default_search_input(),
            first_result: default_first_result(),
            content_path_marker: default_content_path_marker(),
            type_delay_ms: default_type_delay_ms(),
            result_timeout_secs: default_result_timeout_secs(),
            content_timeout_secs: default_content_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverConfig {
    #[serde(default = "default_resolver_program")]
    pub program: String,
    /// Arguments placed before the resolver's own, e.g. a script path when `program` is an interpreter.
    #[serde(default)]
    pub prefix_args: Vec<String>,
    /// Working directory for the tool. Defaults to `~/.watchparty/resolver`.
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default = "default_output_file")]
    pub output_file: String,
    #[serde(default = "default_resolver_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_resolver_program() -> String {
    "animepahe-cli-beta".to_string()
}

fn default_output_file() -> String {
    "stream_link.txt".to_string()
}

fn default_resolver_timeout_secs() -> u64 {
    180
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            program: default_resolver_program(),
            prefix_args: Vec::new(),
            working_dir: None,
            output_file: default_output_file(),
            timeout_secs: default_resolver_timeout_secs(),
        }
    }
}

impl ResolverConfig {
    pub fn working_dir(&self, paths: &Paths) -> PathBuf {
        match &self.working_dir {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => paths.resolver_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
    #[serde(default = "default_player_init_ms")]
    pub init_delay_ms: u64,
    #[serde(default = "default_true")]
    pub fullscreen: bool,
}

fn default_player_init_ms() -> u64 {
    2000
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            init_delay_ms: default_player_init_ms(),
            fullscreen: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

const VC_URL_VARS: &[&str] = &["WATCHPARTY_VC_URL", "VC_URL"];
const BOT_NAME_VARS: &[&str] = &["WATCHPARTY_BOT_NAME", "BOT_NAME"];

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Overlay `VC_URL` / `BOT_NAME` (or their `WATCHPARTY_` forms) from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| lookup(k))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };
        if let Some(url) = first(VC_URL_VARS) {
            self.session.vc_url = url;
        }
        if let Some(name) = first(BOT_NAME_VARS) {
            self.session.bot_name = name;
        }
    }

    /// Fails when anything the bot cannot run without is missing.
    pub fn validate(&self) -> Result<()> {
        if self.session.vc_url.trim().is_empty() {
            return Err(Error::Config(
                "session address is missing: set VC_URL or session.vcUrl".to_string(),
            ));
        }
        if self.session.bot_name.trim().is_empty() {
            return Err(Error::Config(
                "bot name is missing: set BOT_NAME or session.botName".to_string(),
            ));
        }
        Ok(())
    }
}
