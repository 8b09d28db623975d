//! Settings file discovery and loading.
//!
//! The search order is:
//!
//! 1. `$XDG_CONFIG_HOME/muxctx/config.toml`
//! 2. `~/.config/muxctx/config.toml`
//!
//! A missing file is not an error: [`load_default_settings`] falls back to
//! [`Settings::default`].

use crate::config::{DEFAULT_CONFIG, Settings};
use crate::error::{MuxctxError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Determine the settings file path.
///
/// Checks `$XDG_CONFIG_HOME/muxctx/config.toml` first. If that file does not
/// exist, returns `~/.config/muxctx/config.toml`, existing or not, as the
/// location for new configs.
///
/// # Errors
///
/// Returns [`MuxctxError::NoConfigDir`] if the home directory cannot be determined.
pub fn default_config_path() -> Result<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg).join("muxctx").join("config.toml");
        if path.exists() {
            return Ok(path);
        }
    }

    let home = dirs::home_dir().ok_or(MuxctxError::NoConfigDir)?;
    Ok(home.join(".config").join("muxctx").join("config.toml"))
}

/// Load settings from the given path, expanding `~` against `home`.
///
/// # Errors
///
/// - [`MuxctxError::ConfigUnreadable`] if the file exists but cannot be read
/// - [`MuxctxError::ConfigParse`] if TOML parsing fails
pub fn load_settings(path: &Path, home: &Path) -> Result<Settings> {
    let mut settings = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .map_err(|_| MuxctxError::ConfigUnreadable(path.to_path_buf()))?;
        Settings::from_str(&contents)?
    } else {
        debug!(target: "muxctx::loader", "no settings at {}, using defaults", path.display());
        Settings::default()
    };
    settings.expand_paths(home);
    Ok(settings)
}

/// Load settings from the default path.
///
/// Convenience wrapper that combines [`default_config_path`] and [`load_settings`].
pub fn load_default_settings() -> Result<Settings> {
    let home = dirs::home_dir().ok_or(MuxctxError::NoConfigDir)?;
    let path = default_config_path()?;
    load_settings(&path, &home)
}

/// Ensure the settings file exists, writing the commented defaults if it
/// does not. Returns its path.
pub fn ensure_config_file() -> Result<PathBuf> {
    let path = default_config_path()?;
    write_default_if_missing(&path)?;
    Ok(path)
}

fn write_default_if_missing(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::write(path, DEFAULT_CONFIG)?;
    }
    Ok(())
}
