//! Logging configuration and initialization.
//!
//! Filters come from `MUXCTX_LOG`, then `RUST_LOG`, then the `-v` count on
//! the command line. Full-screen commands log to a file under the cache
//! directory so that log lines never land on top of the UI.

use crate::error::{MuxctxError, Result};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    Stderr,
    File(PathBuf),
}

impl LogDestination {
    /// `<cache dir>/muxctx/muxctx.log`
    pub fn default_file() -> Result<Self> {
        let cache = dirs::cache_dir().ok_or(MuxctxError::NoConfigDir)?;
        Ok(LogDestination::File(cache.join("muxctx").join("muxctx.log")))
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Number of `-v` flags given.
    pub verbosity: u8,
    pub destination: LogDestination,
}

impl LogConfig {
    pub fn new(verbosity: u8, destination: LogDestination) -> Self {
        LogConfig {
            verbosity,
            destination,
        }
    }

    /// Directive used when neither environment variable is set.
    pub fn default_directive(&self) -> &'static str {
        match self.verbosity {
            0 => "muxctx=warn",
            1 => "muxctx=info",
            2 => "muxctx=debug",
            _ => "muxctx=trace",
        }
    }

    pub fn build_filter(&self) -> EnvFilter {
        if let Ok(filter) = EnvFilter::try_from_env("MUXCTX_LOG") {
            return filter;
        }
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
        EnvFilter::new(self.default_directive())
    }
}

/// Install the global subscriber. Calling it twice keeps the first one.
pub fn init(config: &LogConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(config.build_filter());
    match &config.destination {
        LogDestination::Stderr => {
            let _ = registry
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .without_time(),
                )
                .try_init();
        }
        LogDestination::File(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let _ = registry
                .with(
                    fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false)
                        .with_target(true),
                )
                .try_init();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_directives() {
        let levels: Vec<_> = (0..5)
            .map(|v| LogConfig::new(v, LogDestination::Stderr).default_directive())
            .collect();
        assert_eq!(
            levels,
            vec![
                "muxctx=warn",
                "muxctx=info",
                "muxctx=debug",
                "muxctx=trace",
                "muxctx=trace"
            ]
        );
    }

    #[test]
    fn test_init_to_file_creates_parent() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("logs").join("muxctx.log");
        init(&LogConfig::new(1, LogDestination::File(path.clone()))).unwrap();
        assert!(path.exists());
    }
}
