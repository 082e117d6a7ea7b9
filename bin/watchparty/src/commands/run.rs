use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use watchparty_agent::{
    ActionOutcome, AgentRuntime, CdpContentSearch, CdpFeedReader, CdpSurfaceManager,
    CdpUiActions, CliLinkResolver, CommandPoller, MachineOptions, SessionMachine, UiActions,
};
use watchparty_browser::{BrowserEngine, BrowserSession, LaunchOptions};
use watchparty_core::Paths;

use super::{load_config, Overrides};

pub async fn run(overrides: Overrides, headless: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    let mut config = load_config(&paths, &overrides)?;
    if headless {
        config.browser.headed = false;
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    paths.ensure_dirs()?;

    let launch = LaunchOptions {
        engine: BrowserEngine::from_name(&config.browser.engine),
        binary: config.browser.binary.clone(),
        headed: config.browser.headed,
        user_data_dir: config.browser.profile_dir(&paths),
        extra_args: config.browser.extra_args.clone(),
    };
    let browser = Arc::new(BrowserSession::launch(&launch).await?);
    let main_tab = browser.main_tab();

    info!(url = %config.session.vc_url, "Opening session");
    if let Err(e) = main_tab
        .navigate(&config.session.vc_url, config.browser.navigation_timeout())
        .await
    {
        error!(error = %e, "Could not open the session address");
        browser.close().await;
        return Err(e.into());
    }
    tokio::time::sleep(Duration::from_millis(config.session.initial_load_ms)).await;

    let ui = Arc::new(CdpUiActions::new(browser.clone(), &config.ui));
    match ui.open_chat().await {
        ActionOutcome::Performed => info!("Chat opened"),
        ActionOutcome::AlreadyInState => info!("Chat already open"),
        ActionOutcome::NotFound => warn!("Chat control not found, assuming the feed is visible"),
    }

    let feed = Arc::new(CdpFeedReader::new(
        main_tab.clone(),
        config.poller.message_selector.clone(),
    ));
    let search = Arc::new(CdpContentSearch::new(
        browser.clone(),
        config.catalog.clone(),
        config.browser.navigation_timeout(),
    ));
    let resolver = Arc::new(CliLinkResolver::from_config(&config.resolver, &paths));
    let surfaces = Arc::new(CdpSurfaceManager::new(
        browser.clone(),
        config.player.clone(),
    ));

    let machine = SessionMachine::new(
        ui,
        search,
        resolver,
        surfaces,
        MachineOptions::from_config(&config),
    );
    let poller = CommandPoller::new(feed, config.session.bot_name.clone());
    let runtime = AgentRuntime::new(poller, machine)
        .with_interval(config.poller.interval())
        .with_queue_capacity(config.poller.queue_capacity);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, finishing current command...");
            let _ = shutdown_tx.send(());
        }
    });

    info!(bot = %config.session.bot_name, "watchparty running, press Ctrl+C to stop");
    let session = runtime.run_loop(shutdown_rx).await;

    if main_tab.is_live() {
        browser.close().await;
    }
    info!(state = ?session.state(), "watchparty stopped");
    Ok(())
}
