pub mod capability;
pub mod command;
pub mod machine;
pub mod poller;
pub mod resolver;
pub mod runtime;
pub mod search;
pub mod session;
pub mod surface;
pub mod ui;

pub use capability::{
    ActionOutcome, ContentSearch, FeedReader, LinkResolver, Surface, SurfaceManager, UiActions,
};
pub use command::{parse_command, Command};
pub use machine::{Flow, MachineOptions, SessionMachine};
pub use poller::CommandPoller;
pub use resolver::CliLinkResolver;
pub use runtime::AgentRuntime;
pub use search::{run_search, CatalogPage, CdpContentSearch};
pub use session::{ResolvedStream, Session, SessionState};
pub use surface::{player_html, CdpSurfaceManager, PlayerSurface};
pub use ui::{CdpFeedReader, CdpUiActions, ControlPage, ControlSpec, Locator};
