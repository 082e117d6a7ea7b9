//! CDP-based browser automation.
//!
//! - `cdp`: raw Chrome DevTools Protocol client over WebSocket
//! - `session`: browser process launch and tab creation
//! - `tab`: waits, clicks, typing and navigation on one tab
//! - `script`: the JavaScript snippets those operations evaluate

pub mod cdp;
pub mod script;
pub mod session;
pub mod tab;

pub use cdp::CdpClient;
pub use session::{find_browser_binary, BrowserEngine, BrowserSession, LaunchOptions};
pub use tab::Tab;
