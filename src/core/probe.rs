//! Probes - side-effect free reads of job state (log tails, artifact checks, shell queries)

use async_trait::async_trait;
use globset::Glob;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Output reported by an existence probe when the artifact is present
pub const PRESENT: &str = "yes";

/// Output reported by an existence probe when the artifact is missing
pub const ABSENT: &str = "no";

/// Chunk size used when reading a log backwards from its end
const TAIL_BLOCK: u64 = 8 * 1024;

/// Error types for probe execution
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid artifact pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Failed to run probe command '{command}': {reason}")]
    Command { command: String, reason: String },

    #[error("Probe command '{command}' timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },
}

/// A read-only query against the filesystem or a shell command.
///
/// Probes are re-run from scratch on every polling tick, so they must be
/// idempotent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Run `sh -c <command>` in the working directory and capture stdout
    Shell { command: String },

    /// Check whether any file matches a glob pattern (relative to the working directory).
    /// Produces [`PRESENT`] or [`ABSENT`].
    Exists { pattern: String },

    /// The last `lines` lines of a file; empty when the file does not exist yet
    Tail { path: PathBuf, lines: usize },
}

impl Probe {
    pub fn shell(command: impl Into<String>) -> Self {
        Probe::Shell {
            command: command.into(),
        }
    }

    pub fn exists(pattern: impl Into<String>) -> Self {
        Probe::Exists {
            pattern: pattern.into(),
        }
    }

    pub fn tail(path: impl Into<PathBuf>, lines: usize) -> Self {
        Probe::Tail {
            path: path.into(),
            lines,
        }
    }

    /// The artifact this probe looks at, for diagnostics
    pub fn artifact(&self) -> String {
        match self {
            Probe::Shell { command } => command.clone(),
            Probe::Exists { pattern } => pattern.clone(),
            Probe::Tail { path, .. } => path.display().to_string(),
        }
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::Shell { command } => write!(f, "sh -c '{}'", command),
            Probe::Exists { pattern } => write!(f, "exists {}", pattern),
            Probe::Tail { path, lines } => write!(f, "tail -n {} {}", lines, path.display()),
        }
    }
}

/// Trait for probe execution - lets tests script probe output
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    /// Run a probe relative to `workdir` and return its text output
    async fn run(&self, probe: &Probe, workdir: &Path) -> Result<String, ProbeError>;
}

/// Probe executor backed by the local filesystem and `sh`
#[derive(Debug, Clone)]
pub struct LocalProbeExecutor {
    /// Upper bound for shell probes
    command_timeout_secs: u64,
}

impl Default for LocalProbeExecutor {
    fn default() -> Self {
        Self {
            command_timeout_secs: 60,
        }
    }
}

impl LocalProbeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command_timeout(mut self, secs: u64) -> Self {
        self.command_timeout_secs = secs;
        self
    }

    async fn run_shell(&self, command: &str, workdir: &Path) -> Result<String, ProbeError> {
        let output = timeout(
            Duration::from_secs(self.command_timeout_secs),
            Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(workdir)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ProbeError::Timeout {
            command: command.to_string(),
            secs: self.command_timeout_secs,
        })?
        .map_err(|e| ProbeError::Command {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

        // A failing command (e.g. `ls` on a missing file) still yields usable stdout
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ProbeExecutor for LocalProbeExecutor {
    async fn run(&self, probe: &Probe, workdir: &Path) -> Result<String, ProbeError> {
        debug!("Running probe [{}] in {}", probe, workdir.display());
        match probe {
            Probe::Shell { command } => self.run_shell(command, workdir).await,
            Probe::Exists { pattern } => {
                let answer = if artifact_exists(workdir, pattern)? {
                    PRESENT
                } else {
                    ABSENT
                };
                Ok(answer.to_string())
            }
            Probe::Tail { path, lines } => tail_file(&workdir.join(path), *lines),
        }
    }
}

/// Check whether any entry in the pattern's directory matches its file name glob
pub fn artifact_exists(workdir: &Path, pattern: &str) -> Result<bool, ProbeError> {
    let relative = Path::new(pattern);
    let dir = match relative.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => workdir.join(parent),
        _ => workdir.to_path_buf(),
    };
    let file_pattern = relative
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let matcher = Glob::new(&file_pattern)
        .map_err(|source| ProbeError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?
        .compile_matcher();

    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(source) => return Err(ProbeError::Io { path: dir, source }),
    };

    Ok(entries
        .filter_map(|entry| entry.ok())
        .any(|entry| matcher.is_match(entry.file_name())))
}

/// Return the last `lines` lines of a file, or an empty string if it doesn't exist.
/// Only the end of the file is read.
pub fn tail_file(path: &Path, lines: usize) -> Result<String, ProbeError> {
    let io_error = |source: std::io::Error| ProbeError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
        Err(source) => return Err(io_error(source)),
    };

    // More than `lines` line breaks means the last `lines` lines are complete
    let mut pos = file.seek(SeekFrom::End(0)).map_err(io_error)?;
    let mut buf: Vec<u8> = Vec::new();
    let mut breaks = 0;
    while pos > 0 && breaks <= lines {
        let size = pos.min(TAIL_BLOCK);
        pos -= size;
        let mut block = vec![0; size as usize];
        file.seek(SeekFrom::Start(pos)).map_err(io_error)?;
        file.read_exact(&mut block).map_err(io_error)?;

        breaks += block.iter().filter(|&&b| b == b'\n').count();
        block.extend_from_slice(&buf);
        buf = block;
    }

    let text = String::from_utf8_lossy(&buf);
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    Ok(all[start..].join("\n"))
}
