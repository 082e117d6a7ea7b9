pub mod config;
pub mod error;
pub mod paths;

pub use config::{
    BrowserConfig, CatalogConfig, Config, ControlConfig, PlayerConfig, PollerConfig,
    ResolverConfig, SessionConfig, StopMode, UiConfig,
};
pub use error::{Error, Result};
pub use paths::Paths;
