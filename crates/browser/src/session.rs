//! Browser process management.
//!
//! Launches one Chromium-family browser with remote debugging enabled and a
//! persistent profile, and hands out CDP connections to its tabs.

use super::tab::Tab;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};
use watchparty_core::{Error, Result};

/// Supported browser engines. Both speak CDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserEngine {
    Chrome,
    Edge,
}

impl BrowserEngine {
    pub fn from_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "edge" | "msedge" => Self::Edge,
            _ => Self::Chrome,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Edge => "edge",
        }
    }
}

/// Everything needed to start the browser.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub engine: BrowserEngine,
    /// Explicit binary; discovered when `None`.
    pub binary: Option<String>,
    pub headed: bool,
    pub user_data_dir: PathBuf,
    pub extra_args: Vec<String>,
}

/// A running browser and the CDP connection to its first tab.
pub struct BrowserSession {
    /// Remote debugging port used to discover per-target WebSocket URLs.
    debug_port: u16,
    process: Mutex<Child>,
    main_tab: Arc<Tab>,
}

impl BrowserSession {
    /// Launch a browser instance and connect to its first page target.
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        let browser_path = match &options.binary {
            Some(path) => path.clone(),
            None => find_browser_binary(options.engine).ok_or_else(|| {
                Error::Browser(format!(
                    "{} not found. Please install it or set browser.binary.",
                    options.engine.name()
                ))
            })?,
        };

        std::fs::create_dir_all(&options.user_data_dir)?;

        let debug_port = find_free_port().await?;
        let args = build_browser_args(
            debug_port,
            &options.user_data_dir,
            options.headed,
            &options.extra_args,
        );

        info!(
            port = debug_port,
            headed = options.headed,
            browser = options.engine.name(),
            profile = %options.user_data_dir.display(),
            "Launching browser"
        );

        let child = Command::new(&browser_path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Browser(format!("Failed to launch {}: {}", options.engine.name(), e))
            })?;

        wait_for_cdp_ready(debug_port, CDP_READY_TIMEOUT)
            .await
            .map_err(Error::Browser)?;

        // Connect to the page target (not browser-level) so Page.enable etc. work
        let (target_id, page_ws_url) = get_page_target(debug_port)
            .await
            .map_err(Error::Browser)?;
        let main_tab = Tab::attach(target_id, &page_ws_url).await?;

        info!(ws_url = %page_ws_url, "CDP connection established (page target)");

        Ok(Self {
            debug_port,
            process: Mutex::new(child),
            main_tab: Arc::new(main_tab),
        })
    }

    /// The tab the browser started with; hosts the chat/voice UI.
    pub fn main_tab(&self) -> Arc<Tab> {
        self.main_tab.clone()
    }

    /// Open a fresh tab at `url` and connect to it.
    pub async fn open_tab(&self, url: &str) -> Result<Tab> {
        let target_id = self
            .main_tab
            .cdp()
            .create_target(url)
            .await
            .map_err(|e| Error::Cdp(format!("create tab: {}", e)))?;
        let ws_url = get_target_ws_url(self.debug_port, &target_id)
            .await
            .map_err(Error::Browser)?;
        let tab = Tab::attach(target_id, &ws_url).await?;
        let _ = self.main_tab.cdp().activate_target(tab.target_id()).await;
        debug!(target_id = tab.target_id(), url, "Opened tab");
        Ok(tab)
    }

    /// Close the whole browser.
    pub async fn close(&self) {
        // Try graceful close via CDP first
        if let Err(e) = self
            .main_tab
            .cdp()
            .send_command("Browser.close", json!({}))
            .await
        {
            debug!("CDP Browser.close failed (may already be closed): {}", e);
        }
        let mut child = self.process.lock().await;
        let _ = child.kill().await;
    }
}

/// Build the browser command line.
pub fn build_browser_args(
    debug_port: u16,
    user_data_dir: &Path,
    headed: bool,
    extra_args: &[String],
) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--disable-translate".to_string(),
        "--password-store=basic".to_string(),
        // Voice rooms ask for mic/camera; grant without a prompt.
        "--use-fake-ui-for-media-stream".to_string(),
        "--autoplay-policy=no-user-gesture-required".to_string(),
        "--disable-features=AudioServiceOutOfProcess".to_string(),
    ];
    if headed {
        args.push("--start-fullscreen".to_string());
    } else {
        args.push("--headless=new".to_string());
        args.push("--window-size=1920,1080".to_string());
    }
    args.extend(extra_args.iter().cloned());
    args.push("about:blank".to_string());
    args
}

/// Find a browser binary on the system for the given engine.
pub fn find_browser_binary(engine: BrowserEngine) -> Option<String> {
    let candidates = match engine {
        BrowserEngine::Chrome => {
            if cfg!(target_os = "macos") {
                vec![
                    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                    "/Applications/Chromium.app/Contents/MacOS/Chromium",
                ]
            } else if cfg!(target_os = "linux") {
                vec![
                    "google-chrome",
                    "google-chrome-stable",
                    "chromium",
                    "chromium-browser",
                    "/usr/bin/google-chrome",
                    "/usr/bin/chromium",
                ]
            } else {
                vec![
                    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
                ]
            }
        }
        BrowserEngine::Edge => {
            if cfg!(target_os = "macos") {
                vec!["/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"]
            } else if cfg!(target_os = "linux") {
                vec!["microsoft-edge", "microsoft-edge-stable", "/usr/bin/microsoft-edge"]
            } else {
                vec![
                    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
                    r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
                ]
            }
        }
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok()
        {
            return Some(candidate.to_string());
        }
    }
    None
}

/// Find a free TCP port.
async fn find_free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

const CDP_READY_TIMEOUT: Duration = Duration::from_secs(15);
const DISCOVERY_ATTEMPTS: u32 = 10;
const DISCOVERY_STEP: Duration = Duration::from_millis(300);

/// Poll `/json/version` until the debugging endpoint answers.
async fn wait_for_cdp_ready(port: u16, timeout: Duration) -> std::result::Result<(), String> {
    let url = format!("http://127.0.0.1:{}/json/version", port);
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        let answered = match reqwest::get(&url).await {
            Ok(resp) => resp.json::<Value>().await.ok(),
            Err(_) => None,
        };
        if answered
            .as_ref()
            .and_then(|v| v.get("webSocketDebuggerUrl"))
            .is_some()
        {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    Err(format!(
        "browser debugging endpoint on port {} not ready after {}s",
        port,
        timeout.as_secs()
    ))
}

async fn list_targets(port: u16) -> Option<Vec<Value>> {
    let url = format!("http://127.0.0.1:{}/json/list", port);
    reqwest::get(&url).await.ok()?.json().await.ok()
}

/// `(id, webSocketDebuggerUrl)` of a `/json/list` entry.
fn target_endpoint(target: &Value) -> Option<(String, String)> {
    let id = target.get("id").and_then(Value::as_str)?;
    let ws = target.get("webSocketDebuggerUrl").and_then(Value::as_str)?;
    Some((id.to_string(), ws.to_string()))
}

fn pick_page_target(targets: &[Value]) -> Option<(String, String)> {
    targets
        .iter()
        .filter(|t| t.get("type").and_then(Value::as_str) == Some("page"))
        .find_map(target_endpoint)
}

/// Re-list targets until `pick` finds one; new tabs take a moment to show up.
async fn discover_target<F>(port: u16, what: &str, pick: F) -> std::result::Result<(String, String), String>
where
    F: Fn(&[Value]) -> Option<(String, String)>,
{
    for attempt in 0..DISCOVERY_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(DISCOVERY_STEP).await;
        }
        if let Some(found) = list_targets(port).await.as_deref().and_then(&pick) {
            return Ok(found);
        }
    }
    Err(format!("{} not listed by the browser", what))
}

async fn get_page_target(port: u16) -> std::result::Result<(String, String), String> {
    discover_target(port, "page target", pick_page_target).await
}

async fn get_target_ws_url(port: u16, target_id: &str) -> std::result::Result<String, String> {
    let (_, ws_url) = discover_target(port, &format!("target {}", target_id), |targets| {
        targets
            .iter()
            .filter_map(target_endpoint)
            .find(|(id, _)| id.as_str() == target_id)
    })
    .await?;
    Ok(ws_url)
}
