//! One browser tab and the page-level operations the bot needs on it.

use super::cdp::CdpClient;
use super::script;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;
use watchparty_core::{Error, Result};

const POLL_STEP: Duration = Duration::from_millis(200);

pub struct Tab {
    target_id: String,
    cdp: CdpClient,
    closed: AtomicBool,
}

impl Tab {
    /// Connect to an existing target and enable the domains we use.
    pub async fn attach(target_id: String, ws_url: &str) -> Result<Self> {
        let cdp = CdpClient::connect(ws_url).await.map_err(cdp_err)?;
        cdp.enable_domain("Page").await.map_err(cdp_err)?;
        cdp.enable_domain("Runtime").await.map_err(cdp_err)?;
        Ok(Self {
            target_id,
            cdp,
            closed: AtomicBool::new(false),
        })
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn cdp(&self) -> &CdpClient {
        &self.cdp
    }

    pub fn is_live(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.cdp.is_open()
    }

    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        self.cdp.evaluate_value(expression).await.map_err(cdp_err)
    }

    pub async fn evaluate_bool(&self, expression: &str) -> Result<bool> {
        Ok(self.evaluate(expression).await?.as_bool().unwrap_or(false))
    }

    pub async fn evaluate_string(&self, expression: &str) -> Result<Option<String>> {
        Ok(self.evaluate(expression).await?.as_str().map(|s| s.to_string()))
    }

    /// Poll `predicate` until it evaluates to true or `timeout` elapses.
    /// Returns `Ok(false)` on timeout; evaluation errors propagate.
    pub async fn wait_until(&self, predicate: &str, timeout: Duration) -> Result<bool> {
        let start = Instant::now();
        loop {
            if self.evaluate_bool(predicate).await? {
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(POLL_STEP).await;
        }
    }

    /// Navigate and wait for DOM content to be loaded.
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let navigated = tokio::time::timeout(timeout, async {
            self.cdp.navigate(url).await.map_err(cdp_err)?;
            // The old document may still answer for a moment after the commit.
            tokio::time::sleep(POLL_STEP).await;
            self.wait_until(script::DOM_READY, timeout).await
        })
        .await;
        match navigated {
            Ok(Ok(true)) => {
                debug!(url, "Navigation complete");
                Ok(())
            }
            Ok(Ok(false)) | Err(_) => Err(Error::NavigationTimeout(format!(
                "{} did not load within {}s",
                url,
                timeout.as_secs()
            ))),
            Ok(Err(e)) => Err(e),
        }
    }

    pub async fn wait_for_selector(
        &self,
        selector: &str,
        visible: bool,
        timeout: Duration,
    ) -> Result<()> {
        let predicate = if visible {
            script::selector_visible(selector)
        } else {
            script::selector_exists(selector)
        };
        if self.wait_until(&predicate, timeout).await? {
            Ok(())
        } else {
            Err(Error::UiElementNotFound(format!(
                "{} not found within {}ms",
                selector,
                timeout.as_millis()
            )))
        }
    }

    pub async fn click_selector(&self, selector: &str) -> Result<bool> {
        self.evaluate_bool(&script::click_selector(selector)).await
    }

    pub async fn click_by_text(&self, text: &str) -> Result<bool> {
        self.evaluate_bool(&script::click_by_text(text)).await
    }

    /// Focus `selector` and type `text` one character at a time.
    pub async fn type_into(&self, selector: &str, text: &str, key_delay: Duration) -> Result<()> {
        if !self.evaluate_bool(&script::focus_selector(selector)).await? {
            return Err(Error::UiElementNotFound(format!(
                "cannot focus {}",
                selector
            )));
        }
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            self.cdp
                .insert_text(ch.encode_utf8(&mut buf))
                .await
                .map_err(cdp_err)?;
            if !key_delay.is_zero() {
                tokio::time::sleep(key_delay).await;
            }
        }
        Ok(())
    }

    pub async fn current_url(&self) -> Result<String> {
        self.evaluate_string(script::LOCATION_HREF)
            .await?
            .ok_or_else(|| Error::Cdp("location.href was not a string".to_string()))
    }

    /// Wait until the tab's address contains `marker`, then return it.
    pub async fn wait_for_url_containing(&self, marker: &str, timeout: Duration) -> Result<String> {
        let start = Instant::now();
        loop {
            // Reads can fail mid-navigation while the old context is torn down.
            if let Ok(url) = self.current_url().await {
                if url.contains(marker) {
                    return Ok(url);
                }
            }
            if start.elapsed() >= timeout {
                return Err(Error::NavigationTimeout(format!(
                    "address never matched '{}' within {}s",
                    marker,
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(POLL_STEP).await;
        }
    }

    /// Replace the page with `html`.
    pub async fn set_content(&self, html: &str) -> Result<()> {
        self.cdp.set_document_content(html).await.map_err(cdp_err)
    }

    /// Close the tab. Closing an already closed tab is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) || !self.cdp.is_open() {
            return Ok(());
        }
        match self.cdp.close_target(&self.target_id).await {
            Ok(()) => Ok(()),
            // The socket dies with the target; a lost reply still means closed.
            Err(_) if !self.cdp.is_open() => Ok(()),
            Err(e) => Err(cdp_err(e)),
        }
    }
}

/// Convert CDP error string to a watchparty Error.
pub fn cdp_err(e: String) -> Error {
    Error::Cdp(e)
}
