use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CDP error: {0}")]
    Cdp(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("UI element not found: {0}")]
    UiElementNotFound(String),

    #[error("Navigation timeout: {0}")]
    NavigationTimeout(String),

    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Surface error: {0}")]
    Surface(String),
}

pub type Result<T> = std::result::Result<T, Error>;
