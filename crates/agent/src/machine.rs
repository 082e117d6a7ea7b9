//! Command-driven session state machine.
//!
//! The machine owns no state of its own: `apply` takes the `Session` by mutable
//! reference and drives the injected capabilities. Every step is isolated; a
//! failure aborts the rest of the current command and nothing else.

use crate::capability::{ActionOutcome, ContentSearch, LinkResolver, SurfaceManager, UiActions};
use crate::command::Command;
use crate::session::{ResolvedStream, Session, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use watchparty_core::{Config, StopMode};

/// What the runtime should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The browser session was ended; stop polling.
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct MachineOptions {
    pub stop_mode: StopMode,
    pub assume_joined_when_missing: bool,
    /// Pause after a successful join click.
    pub join_settle: Duration,
    /// Pause after the share click, while the screen picker is up.
    pub share_settle: Duration,
}

impl MachineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stop_mode: config.session.stop_mode,
            assume_joined_when_missing: config.session.assume_joined_when_missing,
            join_settle: Duration::from_millis(config.session.join_settle_ms),
            share_settle: Duration::from_millis(config.session.share_settle_ms),
        }
    }
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct SessionMachine {
    ui: Arc<dyn UiActions>,
    search: Arc<dyn ContentSearch>,
    resolver: Arc<dyn LinkResolver>,
    surfaces: Arc<dyn SurfaceManager>,
    options: MachineOptions,
}

impl SessionMachine {
    pub fn new(
        ui: Arc<dyn UiActions>,
        search: Arc<dyn ContentSearch>,
        resolver: Arc<dyn LinkResolver>,
        surfaces: Arc<dyn SurfaceManager>,
        options: MachineOptions,
    ) -> Self {
        Self {
            ui,
            search,
            resolver,
            surfaces,
            options,
        }
    }

    /// Run one command to completion against `session`.
    pub async fn apply(&self, session: &mut Session, command: Command) -> Flow {
        let before = session.state;
        let flow = match command {
            Command::Play { query, episode } => {
                self.play(session, &query, episode).await;
                Flow::Continue
            }
            Command::Pause => {
                self.pause(session).await;
                Flow::Continue
            }
            Command::Resume => {
                self.resume(session).await;
                Flow::Continue
            }
            Command::Stop => self.stop(session).await,
            Command::Unknown => {
                info!("Ignoring unrecognized command");
                Flow::Continue
            }
        };
        if session.state != before {
            info!(from = ?before, to = ?session.state, "Session state changed");
        }
        flow
    }

    // ─── Play ─────────────────────────────────────────────────────────

    async fn play(&self, session: &mut Session, query: &str, episode: u32) {
        if !session.connected() && !self.join(session).await {
            return;
        }

        info!(query, episode, "Searching catalog");
        let source = match self.search.find_source(query).await {
            Ok(source) => source,
            Err(e) => {
                error!(query, error = %e, "Catalog search failed");
                session.state = SessionState::ConnectedNoMedia;
                return;
            }
        };
        info!(source = %source, "Found catalog entry");

        let url = match self.resolver.resolve(&source, episode).await {
            Ok(url) => url,
            Err(e) => {
                error!(source = %source, episode, error = %e, "Link resolution failed");
                session.state = SessionState::ConnectedNoMedia;
                return;
            }
        };
        info!(episode, "Stream link resolved");

        // At most one live surface: the old one goes before the new one exists.
        if let Some(old) = session.surface.take() {
            if let Err(e) = old.dispose().await {
                warn!(error = %e, "Previous player did not close cleanly");
            }
        }
        session.stream = None;

        match self.surfaces.show(&url).await {
            Ok(surface) => {
                session.surface = Some(surface);
                session.stream = Some(ResolvedStream {
                    url,
                    source,
                    episode,
                });
                session.state = SessionState::ConnectedPlaying;
                info!(query, episode, "Now playing");
            }
            Err(e) => {
                error!(error = %e, "Could not start the player");
                session.state = SessionState::ConnectedNoMedia;
            }
        }
    }

    /// Join voice, then best-effort deafen, open chat and share.
    /// Returns false only when joining itself is considered failed.
    async fn join(&self, session: &mut Session) -> bool {
        info!("Joining voice channel");
        session.state = SessionState::Connecting;

        match self.ui.click_join().await {
            ActionOutcome::Performed => {
                info!("Joined voice");
                sleep(self.options.join_settle).await;
            }
            ActionOutcome::AlreadyInState => info!("Already in voice"),
            ActionOutcome::NotFound if self.options.assume_joined_when_missing => {
                warn!("Join control not found, assuming already connected");
            }
            ActionOutcome::NotFound => {
                error!("Join control not found, aborting");
                session.state = SessionState::Idle;
                return false;
            }
        }

        if self.ui.click_deafen().await == ActionOutcome::NotFound {
            warn!("Deafen control not found, continuing");
        }
        if self.ui.open_chat().await == ActionOutcome::NotFound {
            warn!("Chat control not found, continuing");
        }
        match self.ui.click_share().await {
            ActionOutcome::Performed => {
                info!("Screen share requested; pick the screen and go live");
                sleep(self.options.share_settle).await;
            }
            ActionOutcome::AlreadyInState => info!("Already sharing"),
            ActionOutcome::NotFound => warn!("Share control not found (maybe already streaming)"),
        }

        session.state = SessionState::ConnectedNoMedia;
        true
    }

    // ─── Pause / Resume ───────────────────────────────────────────────

    async fn pause(&self, session: &mut Session) {
        if !self.reconcile_surface(session).await {
            return;
        }
        let Some(surface) = session.surface.as_ref() else {
            return;
        };
        match surface.pause().await {
            Ok(()) => {
                info!("Paused");
                session.state = SessionState::ConnectedPaused;
            }
            Err(e) => {
                warn!(error = %e, "Pause failed, dropping player");
                self.forget_surface(session).await;
            }
        }
    }

    async fn resume(&self, session: &mut Session) {
        if !self.reconcile_surface(session).await {
            return;
        }
        let Some(surface) = session.surface.as_ref() else {
            return;
        };
        match surface.resume().await {
            Ok(()) => {
                info!("Resumed");
                session.state = SessionState::ConnectedPlaying;
            }
            Err(e) => {
                warn!(error = %e, "Resume failed, dropping player");
                self.forget_surface(session).await;
            }
        }
    }

    /// True when a live surface exists. A surface that died on its own
    /// (tab closed by hand, browser crash) is forgotten here.
    async fn reconcile_surface(&self, session: &mut Session) -> bool {
        let live = session.surface.as_ref().map(|s| s.is_live());
        match live {
            None => {
                info!("No player, nothing to do");
                false
            }
            Some(false) => {
                warn!("Player is gone, forgetting it");
                self.forget_surface(session).await;
                false
            }
            Some(true) => true,
        }
    }

    async fn forget_surface(&self, session: &mut Session) {
        if let Some(surface) = session.surface.take() {
            if let Err(e) = surface.dispose().await {
                warn!(error = %e, "Error closing player");
            }
        }
        session.stream = None;
        if session.connected() {
            session.state = SessionState::ConnectedNoMedia;
        }
    }

    // ─── Stop ─────────────────────────────────────────────────────────

    async fn stop(&self, session: &mut Session) -> Flow {
        info!("Stopping");

        // Player first, so no audio is left playing into the channel while leaving.
        if let Some(surface) = session.surface.take() {
            match surface.dispose().await {
                Ok(()) => info!("Player closed"),
                Err(e) => warn!(error = %e, "Error closing player"),
            }
        }
        session.stream = None;

        let flow = match self.options.stop_mode {
            StopMode::Leave => {
                match self.ui.click_disconnect().await {
                    ActionOutcome::NotFound => warn!("Disconnect control not found"),
                    _ => info!("Disconnected"),
                }
                Flow::Continue
            }
            StopMode::Terminate => {
                info!("Ending browser session");
                self.ui.end_session().await;
                Flow::Shutdown
            }
        };

        session.state = SessionState::Idle;
        flow
    }
}

async fn sleep(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::capability::Surface;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use watchparty_core::{Error, Result};

    /// Shared, ordered record of every capability call.
    #[derive(Clone, Default)]
    pub(crate) struct Log(Arc<Mutex<Vec<String>>>);

    impl Log {
        pub(crate) fn push(&self, entry: impl Into<String>) {
            self.0.lock().unwrap().push(entry.into());
        }

        pub(crate) fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        pub(crate) fn count(&self, prefix: &str) -> usize {
            self.entries().iter().filter(|e| e.starts_with(prefix)).count()
        }
    }

    pub(crate) struct FakeUi {
        pub(crate) log: Log,
        pub(crate) join: Mutex<ActionOutcome>,
        pub(crate) share: ActionOutcome,
        pub(crate) disconnect: ActionOutcome,
    }

    #[async_trait]
    impl UiActions for FakeUi {
        async fn click_join(&self) -> ActionOutcome {
            self.log.push("join");
            *self.join.lock().unwrap()
        }
        async fn click_deafen(&self) -> ActionOutcome {
            self.log.push("deafen");
            ActionOutcome::NotFound
        }
        async fn open_chat(&self) -> ActionOutcome {
            self.log.push("chat");
            ActionOutcome::AlreadyInState
        }
        async fn click_share(&self) -> ActionOutcome {
            self.log.push("share");
            self.share
        }
        async fn click_disconnect(&self) -> ActionOutcome {
            self.log.push("disconnect");
            self.disconnect
        }
        async fn end_session(&self) {
            self.log.push("end_session");
        }
    }

    pub(crate) struct FakeSearch {
        pub(crate) log: Log,
        pub(crate) fail: AtomicBool,
    }

    #[async_trait]
    impl ContentSearch for FakeSearch {
        async fn find_source(&self, query: &str) -> Result<String> {
            self.log.push(format!("search:{}", query));
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::NavigationTimeout("no results".to_string()));
            }
            Ok(format!("https://catalog.example/anime/{}", query.replace(' ', "-")))
        }
    }

    pub(crate) struct FakeResolver {
        pub(crate) log: Log,
        pub(crate) fail: AtomicBool,
    }

    #[async_trait]
    impl LinkResolver for FakeResolver {
        async fn resolve(&self, source: &str, episode: u32) -> Result<String> {
            self.log.push(format!("resolve:{}:{}", source, episode));
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Resolution("tool exited with status 1".to_string()));
            }
            Ok(format!("https://cdn.example/{}.mp4", episode))
        }
    }

    pub(crate) struct FakeSurface {
        id: usize,
        log: Log,
        live: Arc<AtomicUsize>,
        alive: AtomicBool,
        pub(crate) killed: Arc<AtomicBool>,
        /// Every call fails while set.
        broken: Arc<AtomicBool>,
    }

    impl FakeSurface {
        fn check(&self) -> Result<()> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(Error::Surface("Target closed".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Surface for FakeSurface {
        fn is_live(&self) -> bool {
            self.alive.load(Ordering::SeqCst) && !self.killed.load(Ordering::SeqCst)
        }
        async fn pause(&self) -> Result<()> {
            self.log.push(format!("pause:{}", self.id));
            self.check()
        }
        async fn resume(&self) -> Result<()> {
            self.log.push(format!("resume:{}", self.id));
            self.check()
        }
        async fn dispose(&self) -> Result<()> {
            if self.broken.load(Ordering::SeqCst) {
                self.log.push(format!("dispose_failed:{}", self.id));
                return self.check();
            }
            if self.alive.swap(false, Ordering::SeqCst) {
                self.log.push(format!("dispose:{}", self.id));
                self.live.fetch_sub(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    pub(crate) struct FakeSurfaces {
        log: Log,
        next_id: AtomicUsize,
        pub(crate) live: Arc<AtomicUsize>,
        pub(crate) max_live: AtomicUsize,
        pub(crate) last_killed: Mutex<Option<Arc<AtomicBool>>>,
        pub(crate) fail: AtomicBool,
        pub(crate) broken: Arc<AtomicBool>,
    }

    #[async_trait]
    impl SurfaceManager for FakeSurfaces {
        async fn show(&self, url: &str) -> Result<Box<dyn Surface>> {
            if self.fail.load(Ordering::SeqCst) {
                self.log.push("show_failed");
                return Err(Error::Surface("tab crashed".to_string()));
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            self.log.push(format!("show:{}:{}", id, url));
            let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_live.fetch_max(now, Ordering::SeqCst);
            let killed = Arc::new(AtomicBool::new(false));
            *self.last_killed.lock().unwrap() = Some(killed.clone());
            Ok(Box::new(FakeSurface {
                id,
                log: self.log.clone(),
                live: self.live.clone(),
                alive: AtomicBool::new(true),
                killed,
                broken: self.broken.clone(),
            }))
        }
    }

    pub(crate) struct Harness {
        pub(crate) log: Log,
        pub(crate) ui: Arc<FakeUi>,
        pub(crate) search: Arc<FakeSearch>,
        pub(crate) resolver: Arc<FakeResolver>,
        pub(crate) surfaces: Arc<FakeSurfaces>,
    }

    impl Harness {
        pub(crate) fn new() -> Self {
            let log = Log::default();
            Self {
                ui: Arc::new(FakeUi {
                    log: log.clone(),
                    join: Mutex::new(ActionOutcome::Performed),
                    share: ActionOutcome::Performed,
                    disconnect: ActionOutcome::Performed,
                }),
                search: Arc::new(FakeSearch {
                    log: log.clone(),
                    fail: AtomicBool::new(false),
                }),
                resolver: Arc::new(FakeResolver {
                    log: log.clone(),
                    fail: AtomicBool::new(false),
                }),
                surfaces: Arc::new(FakeSurfaces {
                    log: log.clone(),
                    next_id: AtomicUsize::new(0),
                    live: Arc::new(AtomicUsize::new(0)),
                    max_live: AtomicUsize::new(0),
                    last_killed: Mutex::new(None),
                    fail: AtomicBool::new(false),
                    broken: Arc::new(AtomicBool::new(false)),
                }),
                log,
            }
        }

        pub(crate) fn machine(&self, options: MachineOptions) -> SessionMachine {
            SessionMachine::new(
                self.ui.clone(),
                self.search.clone(),
                self.resolver.clone(),
                self.surfaces.clone(),
                options,
            )
        }
    }

    pub(crate) fn fast_options() -> MachineOptions {
        MachineOptions {
            stop_mode: StopMode::Leave,
            assume_joined_when_missing: true,
            join_settle: Duration::ZERO,
            share_settle: Duration::ZERO,
        }
    }

    fn play(query: &str, episode: u32) -> Command {
        Command::Play {
            query: query.to_string(),
            episode,
        }
    }

    #[tokio::test]
    async fn test_play_from_idle_joins_then_plays() {
        let h = Harness::new();
        let machine = h.machine(fast_options());
        let mut session = Session::new();

        let flow = machine.apply(&mut session, play("Attack on Titan", 5)).await;

        assert_eq!(flow, Flow::Continue);
        assert_eq!(session.state(), SessionState::ConnectedPlaying);
        assert!(session.has_surface());
        let stream = session.stream().unwrap();
        assert_eq!(stream.url, "https://cdn.example/5.mp4");
        assert_eq!(stream.source, "https://catalog.example/anime/Attack-on-Titan");
        assert_eq!(stream.episode, 5);
        assert_eq!(
            h.log.entries(),
            vec![
                "join",
                "deafen",
                "chat",
                "share",
                "search:Attack on Titan",
                "resolve:https://catalog.example/anime/Attack-on-Titan:5",
                "show:1:https://cdn.example/5.mp4",
            ]
        );
    }

    #[tokio::test]
    async fn test_pause_and_resume_keep_stream() {
        let h = Harness::new();
        let machine = h.machine(fast_options());
        let mut session = Session::new();
        machine.apply(&mut session, play("Frieren", 1)).await;

        machine.apply(&mut session, Command::Pause).await;
        assert_eq!(session.state(), SessionState::ConnectedPaused);
        assert_eq!(session.stream().unwrap().url, "https://cdn.example/1.mp4");

        machine.apply(&mut session, Command::Resume).await;
        assert_eq!(session.state(), SessionState::ConnectedPlaying);
        assert_eq!(session.stream().unwrap().url, "https://cdn.example/1.mp4");
        assert_eq!(h.log.count("pause:1"), 1);
        assert_eq!(h.log.count("resume:1"), 1);
    }

    #[tokio::test]
    async fn test_pause_resume_without_surface_are_noops() {
        let h = Harness::new();
        let machine = h.machine(fast_options());
        let mut session = Session::new();

        machine.apply(&mut session, Command::Pause).await;
        assert_eq!(session.state(), SessionState::Idle);
        machine.apply(&mut session, Command::Resume).await;
        assert_eq!(session.state(), SessionState::Idle);
        assert!(h.log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_second_play_replaces_surface_once() {
        let h = Harness::new();
        let machine = h.machine(fast_options());
        let mut session = Session::new();

        machine.apply(&mut session, play("Dororo", 1)).await;
        machine.apply(&mut session, play("Dororo", 2)).await;

        assert_eq!(session.state(), SessionState::ConnectedPlaying);
        assert_eq!(session.stream().unwrap().episode, 2);
        assert_eq!(h.log.count("join"), 1);
        assert_eq!(h.log.count("dispose:1"), 1);
        assert_eq!(h.surfaces.max_live.load(Ordering::SeqCst), 1);
        assert_eq!(h.surfaces.live.load(Ordering::SeqCst), 1);

        let entries = h.log.entries();
        let dispose_at = entries.iter().position(|e| e == "dispose:1").unwrap();
        let show_at = entries.iter().position(|e| e.starts_with("show:2")).unwrap();
        assert!(dispose_at < show_at);
    }

    #[tokio::test]
    async fn test_resolver_failure_creates_no_surface() {
        let h = Harness::new();
        h.resolver.fail.store(true, Ordering::SeqCst);
        let machine = h.machine(fast_options());
        let mut session = Session::new();

        machine.apply(&mut session, play("Bleach", 3)).await;

        assert_eq!(session.state(), SessionState::ConnectedNoMedia);
        assert!(!session.has_surface());
        assert_eq!(h.log.count("show"), 0);
    }

    #[tokio::test]
    async fn test_resolver_failure_does_not_replace_existing_surface() {
        let h = Harness::new();
        let machine = h.machine(fast_options());
        let mut session = Session::new();
        machine.apply(&mut session, play("Bleach", 3)).await;

        h.resolver.fail.store(true, Ordering::SeqCst);
        machine.apply(&mut session, play("Bleach", 4)).await;

        assert_eq!(session.state(), SessionState::ConnectedNoMedia);
        assert_eq!(h.log.count("dispose"), 0);
        assert_eq!(h.log.count("show"), 1);
        assert!(session.has_surface());
    }

    #[tokio::test]
    async fn test_search_failure_skips_resolver() {
        let h = Harness::new();
        h.search.fail.store(true, Ordering::SeqCst);
        let machine = h.machine(fast_options());
        let mut session = Session::new();

        machine.apply(&mut session, play("Nothing Matches", 1)).await;

        assert_eq!(session.state(), SessionState::ConnectedNoMedia);
        assert_eq!(h.log.count("resolve"), 0);
        assert!(!session.has_surface());
    }

    #[tokio::test]
    async fn test_show_failure_leaves_no_media() {
        let h = Harness::new();
        let machine = h.machine(fast_options());
        let mut session = Session::new();
        machine.apply(&mut session, play("Mushishi", 1)).await;

        h.surfaces.fail.store(true, Ordering::SeqCst);
        machine.apply(&mut session, play("Mushishi", 2)).await;

        assert_eq!(session.state(), SessionState::ConnectedNoMedia);
        assert!(!session.has_surface());
        assert!(session.stream().is_none());
        assert_eq!(h.surfaces.live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_from_every_state_goes_idle() {
        for setup in ["playing", "paused", "nomedia"] {
            let h = Harness::new();
            if setup == "nomedia" {
                h.resolver.fail.store(true, Ordering::SeqCst);
            }
            let machine = h.machine(fast_options());
            let mut session = Session::new();
            machine.apply(&mut session, play("Trigun", 1)).await;
            if setup == "paused" {
                machine.apply(&mut session, Command::Pause).await;
                assert_eq!(session.state(), SessionState::ConnectedPaused);
            }

            let flow = machine.apply(&mut session, Command::Stop).await;

            assert_eq!(flow, Flow::Continue, "{}", setup);
            assert_eq!(session.state(), SessionState::Idle, "{}", setup);
            assert!(!session.has_surface(), "{}", setup);
            assert_eq!(h.surfaces.live.load(Ordering::SeqCst), 0, "{}", setup);
            assert_eq!(h.log.count("disconnect"), 1, "{}", setup);
        }
    }

    #[tokio::test]
    async fn test_stop_disposes_before_disconnect() {
        let h = Harness::new();
        let machine = h.machine(fast_options());
        let mut session = Session::new();
        machine.apply(&mut session, play("Trigun", 1)).await;
        machine.apply(&mut session, Command::Stop).await;

        let entries = h.log.entries();
        let tail: Vec<&str> = entries.iter().rev().take(2).rev().map(String::as_str).collect();
        assert_eq!(tail, vec!["dispose:1", "disconnect"]);
    }

    #[tokio::test]
    async fn test_stop_when_disconnect_missing_still_idle() {
        let mut h = Harness::new();
        h.ui = Arc::new(FakeUi {
            log: h.log.clone(),
            join: Mutex::new(ActionOutcome::Performed),
            share: ActionOutcome::NotFound,
            disconnect: ActionOutcome::NotFound,
        });
        let machine = h.machine(fast_options());
        let mut session = Session::new();
        machine.apply(&mut session, play("Trigun", 1)).await;
        machine.apply(&mut session, Command::Stop).await;
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_terminate_mode_ends_session() {
        let h = Harness::new();
        let machine = h.machine(MachineOptions {
            stop_mode: StopMode::Terminate,
            ..fast_options()
        });
        let mut session = Session::new();
        machine.apply(&mut session, play("Trigun", 1)).await;

        let flow = machine.apply(&mut session, Command::Stop).await;

        assert_eq!(flow, Flow::Shutdown);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(h.log.count("end_session"), 1);
        assert_eq!(h.log.count("disconnect"), 0);
    }

    #[tokio::test]
    async fn test_play_after_stop_rejoins() {
        let h = Harness::new();
        let machine = h.machine(fast_options());
        let mut session = Session::new();
        machine.apply(&mut session, play("Monster", 1)).await;
        machine.apply(&mut session, Command::Stop).await;
        machine.apply(&mut session, play("Monster", 2)).await;

        assert_eq!(h.log.count("join"), 2);
        assert_eq!(session.state(), SessionState::ConnectedPlaying);
    }

    #[tokio::test]
    async fn test_join_not_found_assumed_connected() {
        let h = Harness::new();
        *h.ui.join.lock().unwrap() = ActionOutcome::NotFound;
        let machine = h.machine(fast_options());
        let mut session = Session::new();

        machine.apply(&mut session, play("Monster", 1)).await;

        assert_eq!(session.state(), SessionState::ConnectedPlaying);
    }

    #[tokio::test]
    async fn test_join_not_found_strict_aborts() {
        let h = Harness::new();
        *h.ui.join.lock().unwrap() = ActionOutcome::NotFound;
        let machine = h.machine(MachineOptions {
            assume_joined_when_missing: false,
            ..fast_options()
        });
        let mut session = Session::new();

        machine.apply(&mut session, play("Monster", 1)).await;

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(h.log.entries(), vec!["join"]);
    }

    #[tokio::test]
    async fn test_dead_surface_is_forgotten_on_pause() {
        let h = Harness::new();
        let machine = h.machine(fast_options());
        let mut session = Session::new();
        machine.apply(&mut session, play("Kino", 1)).await;

        let killed = h.surfaces.last_killed.lock().unwrap().clone().unwrap();
        killed.store(true, Ordering::SeqCst);
        machine.apply(&mut session, Command::Pause).await;

        assert_eq!(session.state(), SessionState::ConnectedNoMedia);
        assert!(!session.has_surface());
        assert_eq!(h.log.count("pause"), 0);
    }

    #[tokio::test]
    async fn test_failed_pause_forgets_player_even_if_close_fails() {
        let h = Harness::new();
        let machine = h.machine(fast_options());
        let mut session = Session::new();
        machine.apply(&mut session, play("Kino", 1)).await;

        h.surfaces.broken.store(true, Ordering::SeqCst);
        let flow = machine.apply(&mut session, Command::Pause).await;

        assert_eq!(flow, Flow::Continue);
        assert_eq!(session.state(), SessionState::ConnectedNoMedia);
        assert!(!session.has_surface());
        assert!(session.stream().is_none());
        assert_eq!(h.log.count("dispose_failed:1"), 1);

        // The next play starts from a clean slate.
        h.surfaces.broken.store(false, Ordering::SeqCst);
        machine.apply(&mut session, play("Kino", 2)).await;
        assert_eq!(session.state(), SessionState::ConnectedPlaying);
        assert_eq!(session.stream().unwrap().episode, 2);
    }

    #[tokio::test]
    async fn test_unknown_is_ignored() {
        let h = Harness::new();
        let machine = h.machine(fast_options());
        let mut session = Session::new();
        assert_eq!(machine.apply(&mut session, Command::Unknown).await, Flow::Continue);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(h.log.entries().is_empty());
    }
}
