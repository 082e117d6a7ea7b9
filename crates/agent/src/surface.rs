//! Playback surface: a dedicated tab holding a single `<video>` element.

use crate::capability::{Surface, SurfaceManager};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use watchparty_browser::cdp::extract_value;
use watchparty_browser::{script, BrowserSession, Tab};
use watchparty_core::{Error, PlayerConfig, Result};

const PLAYER_ID: &str = "watchparty-player";

/// A rejected `requestFullscreen` promise comes back as `exceptionDetails`,
/// not as a protocol error.
fn fullscreen_outcome(reply: std::result::Result<Value, String>) -> std::result::Result<(), String> {
    match reply.and_then(extract_value)? {
        Value::Bool(true) => Ok(()),
        _ => Err("player element missing".to_string()),
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Full-viewport, autoplaying player page for `media_url`.
pub fn player_html(media_url: &str) -> String {
    format!(
        concat!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>watchparty</title>",
            "<style>html,body{{margin:0;height:100%;background:#000;overflow:hidden}}",
            "video{{width:100%;height:100%;object-fit:contain}}</style></head>",
            "<body><video id=\"{}\" src=\"{}\" autoplay controls playsinline></video></body></html>"
        ),
        PLAYER_ID,
        escape_html(media_url)
    )
}

pub struct CdpSurfaceManager {
    browser: Arc<BrowserSession>,
    config: PlayerConfig,
}

impl CdpSurfaceManager {
    pub fn new(browser: Arc<BrowserSession>, config: PlayerConfig) -> Self {
        Self { browser, config }
    }
}

#[async_trait]
impl SurfaceManager for CdpSurfaceManager {
    async fn show(&self, media_url: &str) -> Result<Box<dyn Surface>> {
        let tab = self.browser.open_tab("about:blank").await?;
        if let Err(e) = tab.set_content(&player_html(media_url)).await {
            let _ = tab.close().await;
            return Err(Error::Surface(format!("could not load player: {}", e)));
        }
        tokio::time::sleep(Duration::from_millis(self.config.init_delay_ms)).await;

        if self.config.fullscreen {
            let reply = tab
                .cdp()
                .evaluate_js_with_gesture(&script::request_fullscreen(PLAYER_ID))
                .await;
            match fullscreen_outcome(reply) {
                Ok(()) => debug!("Player fullscreen requested"),
                Err(e) => warn!(error = %e, "Fullscreen request failed, playing windowed"),
            }
        }

        info!(target_id = tab.target_id(), "Playback surface shown");
        Ok(Box::new(PlayerSurface { tab }))
    }
}

pub struct PlayerSurface {
    tab: Tab,
}

impl PlayerSurface {
    async fn call(&self, method: &str) -> Result<()> {
        if !self.tab.is_live() {
            return Err(Error::Surface("playback tab is gone".to_string()));
        }
        if self
            .tab
            .evaluate_bool(&script::media_call(PLAYER_ID, method))
            .await?
        {
            Ok(())
        } else {
            Err(Error::Surface(format!("no player element for {}", method)))
        }
    }
}

#[async_trait]
impl Surface for PlayerSurface {
    fn is_live(&self) -> bool {
        self.tab.is_live()
    }

    async fn pause(&self) -> Result<()> {
        self.call("pause").await
    }

    async fn resume(&self) -> Result<()> {
        self.call("play").await
    }

    async fn dispose(&self) -> Result<()> {
        self.tab.close().await
    }
}
