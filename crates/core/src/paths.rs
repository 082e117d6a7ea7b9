use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".watchparty"))
            .unwrap_or_else(|| PathBuf::from(".watchparty"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Persistent browser profile, keeps the chat login between runs.
    pub fn profile_dir(&self) -> PathBuf {
        self.base.join("profile")
    }

    /// Default working directory for the link resolver's handoff file.
    pub fn resolver_dir(&self) -> PathBuf {
        self.base.join("resolver")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.profile_dir())?;
        std::fs::create_dir_all(self.resolver_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
