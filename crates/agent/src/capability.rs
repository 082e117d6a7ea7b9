//! The collaborators the session machine drives.
//!
//! Each trait has a CDP-backed implementation in this crate and a test double in
//! the tests, so the machine never touches selectors, tabs or processes directly.

use async_trait::async_trait;
use watchparty_core::Result;

/// Result of a best-effort UI action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The control was found and clicked.
    Performed,
    /// The control's effect is already in place; nothing was clicked.
    AlreadyInState,
    /// Nothing usable appeared before the wait ran out.
    NotFound,
}

/// Read access to the chat feed.
#[async_trait]
pub trait FeedReader: Send + Sync {
    /// Text of the most recent feed message, `None` when the feed is empty.
    async fn last_message(&self) -> Result<Option<String>>;
}

/// Clicks on the voice/chat UI. Implementations never fail; problems become `NotFound`.
#[async_trait]
pub trait UiActions: Send + Sync {
    async fn click_join(&self) -> ActionOutcome;
    async fn click_deafen(&self) -> ActionOutcome;
    async fn open_chat(&self) -> ActionOutcome;
    async fn click_share(&self) -> ActionOutcome;
    async fn click_disconnect(&self) -> ActionOutcome;
    /// Close the whole browser session.
    async fn end_session(&self);
}

/// Finds the canonical catalog address for a free-text query.
#[async_trait]
pub trait ContentSearch: Send + Sync {
    async fn find_source(&self, query: &str) -> Result<String>;
}

/// Turns a catalog address and episode number into a direct media URL.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    async fn resolve(&self, source: &str, episode: u32) -> Result<String>;
}

/// A live player instance.
#[async_trait]
pub trait Surface: Send + Sync {
    fn is_live(&self) -> bool;
    async fn pause(&self) -> Result<()>;
    async fn resume(&self) -> Result<()>;
    /// Tear the surface down. Disposing twice is a no-op.
    async fn dispose(&self) -> Result<()>;
}

/// Creates player surfaces.
#[async_trait]
pub trait SurfaceManager: Send + Sync {
    async fn show(&self, url: &str) -> Result<Box<dyn Surface>>;
}
