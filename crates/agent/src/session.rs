use crate::capability::Surface;
use serde::Serialize;

/// Where the bot believes it is. The real UI may disagree; see `SessionMachine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    ConnectedNoMedia,
    ConnectedPlaying,
    ConnectedPaused,
}

/// A direct media URL and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedStream {
    pub url: String,
    pub source: String,
    pub episode: u32,
}

/// Process-lifetime session. Only `SessionMachine::apply` mutates it.
pub struct Session {
    pub(crate) state: SessionState,
    pub(crate) surface: Option<Box<dyn Surface>>,
    pub(crate) stream: Option<ResolvedStream>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            surface: None,
            stream: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connected(&self) -> bool {
        matches!(
            self.state,
            SessionState::ConnectedNoMedia
                | SessionState::ConnectedPlaying
                | SessionState::ConnectedPaused
        )
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    /// The stream currently shown, if any.
    pub fn stream(&self) -> Option<&ResolvedStream> {
        self.stream.as_ref()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("surface", &self.surface.is_some())
            .field("stream", &self.stream)
            .finish()
    }
}
