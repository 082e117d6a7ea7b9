//! Catalog search in a throwaway tab.

use crate::capability::ContentSearch;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use watchparty_browser::{BrowserSession, Tab};
use watchparty_core::{CatalogConfig, Error, Result};

/// The tab operations a catalog search drives.
#[async_trait]
pub trait CatalogPage: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;
    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<()>;
    async fn type_into(&self, selector: &str, text: &str, key_delay: Duration) -> Result<()>;
    async fn click_selector(&self, selector: &str) -> Result<bool>;
    async fn wait_for_url_containing(&self, marker: &str, timeout: Duration) -> Result<String>;
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl CatalogPage for Tab {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        Tab::navigate(self, url, timeout).await
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.wait_for_selector(selector, true, timeout).await
    }

    async fn type_into(&self, selector: &str, text: &str, key_delay: Duration) -> Result<()> {
        Tab::type_into(self, selector, text, key_delay).await
    }

    async fn click_selector(&self, selector: &str) -> Result<bool> {
        Tab::click_selector(self, selector).await
    }

    async fn wait_for_url_containing(&self, marker: &str, timeout: Duration) -> Result<String> {
        Tab::wait_for_url_containing(self, marker, timeout).await
    }

    async fn close(&self) -> Result<()> {
        Tab::close(self).await
    }
}

/// Search the catalog for `query` on `page` and return the first result's
/// address. The page is closed whatever the outcome.
pub async fn run_search(
    page: &dyn CatalogPage,
    config: &CatalogConfig,
    navigation_timeout: Duration,
    query: &str,
) -> Result<String> {
    let found = search_steps(page, config, navigation_timeout, query).await;
    if let Err(e) = page.close().await {
        warn!(error = %e, "Could not close search tab");
    }
    found
}

async fn search_steps(
    page: &dyn CatalogPage,
    cfg: &CatalogConfig,
    navigation_timeout: Duration,
    query: &str,
) -> Result<String> {
    let result_timeout = Duration::from_secs(cfg.result_timeout_secs);
    let content_timeout = Duration::from_secs(cfg.content_timeout_secs);

    page.navigate(&cfg.base_url, navigation_timeout).await?;
    page.wait_for_visible(&cfg.search_input, content_timeout)
        .await?;
    page.type_into(
        &cfg.search_input,
        query,
        Duration::from_millis(cfg.type_delay_ms),
    )
    .await?;
    debug!(query, "Query typed");

    page.wait_for_visible(&cfg.first_result, result_timeout)
        .await?;
    if !page.click_selector(&cfg.first_result).await? {
        return Err(Error::UiElementNotFound(format!(
            "first result {} vanished before click",
            cfg.first_result
        )));
    }

    page.wait_for_url_containing(&cfg.content_path_marker, content_timeout)
        .await
}

pub struct CdpContentSearch {
    browser: Arc<BrowserSession>,
    config: CatalogConfig,
    navigation_timeout: Duration,
}

impl CdpContentSearch {
    pub fn new(
        browser: Arc<BrowserSession>,
        config: CatalogConfig,
        navigation_timeout: Duration,
    ) -> Self {
        Self {
            browser,
            config,
            navigation_timeout,
        }
    }
}

#[async_trait]
impl ContentSearch for CdpContentSearch {
    async fn find_source(&self, query: &str) -> Result<String> {
        let tab = self.browser.open_tab("about:blank").await?;
        let source = run_search(&tab, &self.config, self.navigation_timeout, query).await?;
        info!(query, source = %source, "Catalog address captured");
        Ok(source)
    }
}
