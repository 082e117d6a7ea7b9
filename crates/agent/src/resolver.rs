//! Stream link resolution through the external command-line tool.
//!
//! The tool is invoked as `<program> [prefix args] -l <source> -e <episode> -x -f <file>`
//! and is expected to write a single direct media link into `<file>` inside
//! its working directory.

use crate::capability::LinkResolver;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use watchparty_core::{Error, Paths, ResolverConfig, Result};

const STDERR_TAIL_CHARS: usize = 400;

pub struct CliLinkResolver {
    program: PathBuf,
    prefix_args: Vec<String>,
    working_dir: PathBuf,
    output_file: String,
    timeout: Duration,
}

impl CliLinkResolver {
    pub fn new(
        program: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        output_file: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: absolutize_program(program.into()),
            prefix_args: Vec::new(),
            working_dir: working_dir.into(),
            output_file: output_file.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ResolverConfig, paths: &Paths) -> Self {
        Self::new(
            &config.program,
            config.working_dir(paths),
            &config.output_file,
            Duration::from_secs(config.timeout_secs),
        )
        .with_prefix_args(config.prefix_args.clone())
    }

    pub fn with_prefix_args(mut self, args: Vec<String>) -> Self {
        self.prefix_args = args;
        self
    }

    pub fn output_path(&self) -> PathBuf {
        self.working_dir.join(&self.output_file)
    }

    fn build_command(&self, source: &str, episode: u32) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix_args)
            .arg("-l")
            .arg(source)
            .arg("-e")
            .arg(episode.to_string())
            .arg("-x")
            .arg("-f")
            .arg(&self.output_file)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// A relative program path with a directory part is taken relative to our own
/// working directory, not the tool's.
fn absolutize_program(program: PathBuf) -> PathBuf {
    if program.is_absolute() || program.components().count() < 2 {
        return program;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(program),
        Err(_) => program,
    }
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed stale link file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let count = text.chars().count();
    if count <= STDERR_TAIL_CHARS {
        text.to_string()
    } else {
        text.chars().skip(count - STDERR_TAIL_CHARS).collect()
    }
}

#[async_trait]
impl LinkResolver for CliLinkResolver {
    async fn resolve(&self, source: &str, episode: u32) -> Result<String> {
        let output_path = self.output_path();
        tokio::fs::create_dir_all(&self.working_dir).await?;
        // A link left by an earlier run must never be mistaken for this one.
        remove_if_present(&output_path).await?;

        info!(
            program = %self.program.display(),
            source,
            episode,
            "Resolving stream link"
        );

        let output = match timeout(self.timeout, self.build_command(source, episode).output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::Resolution(format!(
                    "failed to start {}: {}",
                    self.program.display(),
                    e
                )));
            }
            Err(_) => {
                let _ = remove_if_present(&output_path).await;
                return Err(Error::Resolution(format!(
                    "resolver timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let _ = remove_if_present(&output_path).await;
            return Err(Error::Resolution(format!(
                "resolver exited with {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            )));
        }

        let content = match tokio::fs::read_to_string(&output_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::Resolution(format!(
                    "resolver finished but wrote no {}",
                    self.output_file
                )));
            }
            Err(e) => {
                let _ = remove_if_present(&output_path).await;
                return Err(Error::Resolution(format!(
                    "could not read {}: {}",
                    self.output_file, e
                )));
            }
        };
        if let Err(e) = remove_if_present(&output_path).await {
            warn!(error = %e, "Could not remove link file");
        }

        let link = content.trim();
        if link.is_empty() {
            return Err(Error::Resolution(format!("{} was empty", self.output_file)));
        }
        info!(link, "Stream link resolved");
        Ok(link.to_string())
    }
}
