//! CDP-backed feed reader and UI actions for the chat/voice tab.
//!
//! Every control is a `ControlSpec` built from the `ui` config section.

use crate::capability::{ActionOutcome, FeedReader, UiActions};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use watchparty_browser::{script, BrowserSession, Tab};
use watchparty_core::{ControlConfig, Result, UiConfig};

const POLL_STEP: Duration = Duration::from_millis(250);
/// Allowance on top of a control's wait for the CDP round trips themselves.
const WAIT_SLACK: Duration = Duration::from_secs(2);

/// One way of finding a control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// CSS selector for a structural marker.
    Selector(String),
    /// Substring of the visible text of a button-like element.
    Text(String),
}

#[derive(Debug, Clone)]
pub struct ControlSpec {
    pub name: &'static str,
    /// Tried in order on every poll.
    pub locators: Vec<Locator>,
    pub already_marker: Option<String>,
    pub wait: Duration,
}

impl ControlSpec {
    pub fn from_config(name: &'static str, config: &ControlConfig) -> Self {
        let mut locators = Vec::new();
        if let Some(selector) = non_blank(&config.selector) {
            locators.push(Locator::Selector(selector));
        }
        if let Some(text) = non_blank(&config.text) {
            locators.push(Locator::Text(text));
        }
        Self {
            name,
            locators,
            already_marker: non_blank(&config.already_marker),
            wait: config.wait(),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// The page queries a control lookup needs.
#[async_trait]
pub trait ControlPage: Send + Sync {
    async fn has_selector(&self, selector: &str) -> Result<bool>;
    /// Click the first match; false when nothing matched.
    async fn click_selector(&self, selector: &str) -> Result<bool>;
    /// Click the first button-like element whose text contains `text`.
    async fn click_by_text(&self, text: &str) -> Result<bool>;
}

#[async_trait]
impl ControlPage for Tab {
    async fn has_selector(&self, selector: &str) -> Result<bool> {
        self.evaluate_bool(&script::selector_exists(selector)).await
    }

    async fn click_selector(&self, selector: &str) -> Result<bool> {
        Tab::click_selector(self, selector).await
    }

    async fn click_by_text(&self, text: &str) -> Result<bool> {
        Tab::click_by_text(self, text).await
    }
}

/// Locate and click one control. Never fails: errors and an overrun of the
/// control's wait both come back as `NotFound`.
pub async fn perform(page: &dyn ControlPage, spec: &ControlSpec) -> ActionOutcome {
    let bound = spec.wait + WAIT_SLACK;
    let outcome = match tokio::time::timeout(bound, try_perform(page, spec)).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            debug!(control = spec.name, error = %e, "UI action failed");
            ActionOutcome::NotFound
        }
        Err(_) => {
            debug!(control = spec.name, "UI action exceeded its wait");
            ActionOutcome::NotFound
        }
    };
    debug!(control = spec.name, outcome = ?outcome, "UI action finished");
    outcome
}

async fn try_perform(page: &dyn ControlPage, spec: &ControlSpec) -> Result<ActionOutcome> {
    let start = Instant::now();
    loop {
        if let Some(marker) = &spec.already_marker {
            if page.has_selector(marker).await? {
                return Ok(ActionOutcome::AlreadyInState);
            }
        }
        for locator in &spec.locators {
            let clicked = match locator {
                Locator::Selector(selector) => page.click_selector(selector).await?,
                Locator::Text(text) => page.click_by_text(text).await?,
            };
            if clicked {
                return Ok(ActionOutcome::Performed);
            }
        }
        if start.elapsed() >= spec.wait {
            return Ok(ActionOutcome::NotFound);
        }
        tokio::time::sleep(POLL_STEP).await;
    }
}

pub struct CdpUiActions {
    browser: Arc<BrowserSession>,
    page: Arc<dyn ControlPage>,
    join: ControlSpec,
    deafen: ControlSpec,
    chat: ControlSpec,
    share: ControlSpec,
    disconnect: ControlSpec,
}

impl CdpUiActions {
    pub fn new(browser: Arc<BrowserSession>, config: &UiConfig) -> Self {
        Self {
            page: browser.main_tab(),
            browser,
            join: ControlSpec::from_config("join", &config.join),
            deafen: ControlSpec::from_config("deafen", &config.deafen),
            chat: ControlSpec::from_config("chat", &config.chat),
            share: ControlSpec::from_config("share", &config.share),
            disconnect: ControlSpec::from_config("disconnect", &config.disconnect),
        }
    }

    async fn perform(&self, spec: &ControlSpec) -> ActionOutcome {
        perform(self.page.as_ref(), spec).await
    }
}

#[async_trait]
impl UiActions for CdpUiActions {
    async fn click_join(&self) -> ActionOutcome {
        self.perform(&self.join).await
    }

    async fn click_deafen(&self) -> ActionOutcome {
        self.perform(&self.deafen).await
    }

    async fn open_chat(&self) -> ActionOutcome {
        self.perform(&self.chat).await
    }

    async fn click_share(&self) -> ActionOutcome {
        self.perform(&self.share).await
    }

    async fn click_disconnect(&self) -> ActionOutcome {
        self.perform(&self.disconnect).await
    }

    async fn end_session(&self) {
        self.browser.close().await;
    }
}

/// Reads the last message of the chat feed.
pub struct CdpFeedReader {
    tab: Arc<Tab>,
    message_selector: String,
}

impl CdpFeedReader {
    pub fn new(tab: Arc<Tab>, message_selector: impl Into<String>) -> Self {
        Self {
            tab,
            message_selector: message_selector.into(),
        }
    }
}

#[async_trait]
impl FeedReader for CdpFeedReader {
    async fn last_message(&self) -> Result<Option<String>> {
        self.tab
            .evaluate_string(&script::last_text(&self.message_selector))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use watchparty_core::Error;

    /// A page with fixed answers that records every query in order.
    #[derive(Default)]
    struct FakePage {
        marker_present: bool,
        selector_hit: bool,
        text_hit: bool,
        broken: bool,
        hang: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakePage {
        async fn answer(&self, call: String, hit: bool) -> Result<bool> {
            self.calls.lock().unwrap().push(call);
            if self.hang {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.broken {
                return Err(Error::Cdp("Execution context was destroyed".to_string()));
            }
            Ok(hit)
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn clicks(&self) -> usize {
            self.calls().iter().filter(|c| c.starts_with("click")).count()
        }
    }

    #[async_trait]
    impl ControlPage for FakePage {
        async fn has_selector(&self, selector: &str) -> Result<bool> {
            self.answer(format!("has:{}", selector), self.marker_present).await
        }

        async fn click_selector(&self, selector: &str) -> Result<bool> {
            self.answer(format!("click_selector:{}", selector), self.selector_hit).await
        }

        async fn click_by_text(&self, text: &str) -> Result<bool> {
            self.answer(format!("click_text:{}", text), self.text_hit).await
        }
    }

    fn chat_spec(wait: Duration) -> ControlSpec {
        ControlSpec {
            name: "chat",
            locators: vec![
                Locator::Selector("button.chat".to_string()),
                Locator::Text("Show Chat".to_string()),
            ],
            already_marker: Some("div.input".to_string()),
            wait,
        }
    }

    #[tokio::test]
    async fn test_marker_wins_and_nothing_is_clicked() {
        let page = FakePage {
            marker_present: true,
            selector_hit: true,
            text_hit: true,
            ..Default::default()
        };
        let outcome = perform(&page, &chat_spec(Duration::from_secs(3))).await;
        assert_eq!(outcome, ActionOutcome::AlreadyInState);
        assert_eq!(page.calls(), vec!["has:div.input".to_string()]);
        assert_eq!(page.clicks(), 0);
    }

    #[tokio::test]
    async fn test_selector_tried_before_text_scan() {
        let page = FakePage {
            text_hit: true,
            ..Default::default()
        };
        let outcome = perform(&page, &chat_spec(Duration::from_secs(3))).await;
        assert_eq!(outcome, ActionOutcome::Performed);
        assert_eq!(
            page.calls(),
            vec![
                "has:div.input".to_string(),
                "click_selector:button.chat".to_string(),
                "click_text:Show Chat".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_selector_hit_skips_text_scan() {
        let page = FakePage {
            selector_hit: true,
            text_hit: true,
            ..Default::default()
        };
        let outcome = perform(&page, &chat_spec(Duration::from_secs(3))).await;
        assert_eq!(outcome, ActionOutcome::Performed);
        assert_eq!(page.clicks(), 1);
    }

    #[tokio::test]
    async fn test_missing_control_is_not_found_after_wait() {
        let page = FakePage::default();
        let started = Instant::now();
        let outcome = perform(&page, &chat_spec(Duration::from_millis(600))).await;
        assert_eq!(outcome, ActionOutcome::NotFound);
        assert!(started.elapsed() >= Duration::from_millis(600));
        // Retried on every step until the wait ran out.
        assert!(page.calls().iter().filter(|c| c.starts_with("has:")).count() >= 2);
    }

    #[tokio::test]
    async fn test_evaluation_error_is_not_found() {
        let page = FakePage {
            broken: true,
            ..Default::default()
        };
        let outcome = perform(&page, &chat_spec(Duration::from_secs(3))).await;
        assert_eq!(outcome, ActionOutcome::NotFound);
        assert_eq!(page.clicks(), 0);
    }

    #[tokio::test]
    async fn test_hung_page_is_bounded() {
        let page = FakePage {
            hang: true,
            ..Default::default()
        };
        let started = Instant::now();
        let outcome = perform(&page, &chat_spec(Duration::from_millis(100))).await;
        assert_eq!(outcome, ActionOutcome::NotFound);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_spec_selector_before_text() {
        let spec = ControlSpec::from_config(
            "chat",
            &ControlConfig {
                selector: Some("button.chat".to_string()),
                text: Some("Show Chat".to_string()),
                already_marker: Some("div.input".to_string()),
                wait_ms: 5000,
            },
        );
        assert_eq!(
            spec.locators,
            vec![
                Locator::Selector("button.chat".to_string()),
                Locator::Text("Show Chat".to_string()),
            ]
        );
        assert_eq!(spec.already_marker.as_deref(), Some("div.input"));
        assert_eq!(spec.wait, Duration::from_secs(5));
    }

    #[test]
    fn test_spec_skips_blank_entries() {
        let spec = ControlSpec::from_config(
            "join",
            &ControlConfig {
                selector: Some("  ".to_string()),
                text: Some("Join Voice".to_string()),
                already_marker: Some(String::new()),
                wait_ms: 0,
            },
        );
        assert_eq!(spec.locators, vec![Locator::Text("Join Voice".to_string())]);
        assert!(spec.already_marker.is_none());
    }

    #[test]
    fn test_default_ui_config_has_a_locator_for_every_control() {
        let ui = UiConfig::default();
        for (name, control) in [
            ("join", &ui.join),
            ("deafen", &ui.deafen),
            ("chat", &ui.chat),
            ("share", &ui.share),
            ("disconnect", &ui.disconnect),
        ] {
            let spec = ControlSpec::from_config(name, control);
            assert!(!spec.locators.is_empty(), "{}", name);
            assert!(spec.wait >= Duration::from_secs(3), "{}", name);
        }
    }
}
