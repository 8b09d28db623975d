//! Error types for muxctx.
//!
//! All errors in muxctx are represented by [`MuxctxError`], which covers
//! multiplexer failures, layout and config parsing, kubeconfig lookups and
//! the completion engine.

use std::path::PathBuf;
use thiserror::Error;

/// All possible errors that can occur in muxctx.
#[derive(Error, Debug)]
pub enum MuxctxError {
    /// A required external binary (tmux, kubectl) is not on `PATH`.
    #[error("Unsupported: {0} not found on PATH")]
    Unsupported(String),

    /// A multiplexer output line, layout string or config could not be parsed.
    #[error("Malformed input: {0}")]
    Malformed(String),

    /// A session, window, pane or context lookup failed.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A deadline elapsed before the operation completed.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A subprocess exited unsuccessfully.
    #[error("{cause}: {}", stderr.trim())]
    Exec {
        /// Captured standard output of the failed command.
        stdout: String,
        /// Captured standard error of the failed command, verbatim.
        stderr: String,
        /// Short description of what was being run.
        cause: String,
    },

    /// Failed to read or write a file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A rename or create target already exists.
    #[error("Already exists: {0}")]
    Conflict(String),

    /// The user or the caller cancelled the operation.
    #[error("Cancelled")]
    Cancelled,

    /// The completion shell is not installed. Callers treat this as "no suggestions".
    #[error("Completion shell not available")]
    MissingShell,

    /// YAML (kubeconfig or session manifest) parsing failed.
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML settings parsing failed.
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Settings file exists but could not be read.
    #[error("Config file not readable: {0}")]
    ConfigUnreadable(PathBuf),

    /// Could not determine the user's home or config directory.
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// The terminal is too small for the interactive UI.
    #[error("Terminal too small: need at least {min_width}x{min_height}")]
    TerminalTooSmall {
        /// Minimum number of columns.
        min_width: u16,
        /// Minimum number of rows.
        min_height: u16,
    },
}

impl MuxctxError {
    /// Build an [`MuxctxError::Exec`] from a finished process.
    pub fn exec(cause: impl Into<String>, output: &std::process::Output) -> Self {
        MuxctxError::Exec {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            cause: cause.into(),
        }
    }

    /// Process exit code for this error: 156 (128+28) when the terminal is
    /// too small, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            MuxctxError::TerminalTooSmall { .. } => 128 + 28,
            _ => 1,
        }
    }

    /// Whether the error is silent in the UI (no toast).
    pub fn is_silent(&self) -> bool {
        matches!(self, MuxctxError::MissingShell | MuxctxError::Cancelled)
    }
}

/// Convenient Result type alias for muxctx operations.
pub type Result<T> = std::result::Result<T, MuxctxError>;
