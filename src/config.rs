//! Configuration types for muxctx.
//!
//! This module defines the data structures that map to the TOML settings
//! file. Every section and key is optional; anything left out falls back to
//! the defaults shown below.
//!
//! # Config Format
//!
//! ```toml
//! [popup]
//! width = "80%"
//! height = "80%"
//! title = " muxctx "
//! border_color = "blue"
//!
//! [completion]
//! # shell = "/usr/bin/zsh"
//! timeout_ms = 5000
//!
//! [sessions]
//! sort = "name"            # name | name-reverse | oldest | newest
//! manifest = "~/.config/muxctx/sessions.yaml"
//! tmux_config_files = ["~/.tmux.conf", "~/.config/tmux/tmux.conf"]
//! ready_attempts = 200
//!
//! [repositories]
//! roots = ["~/src"]
//! depth = 3
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Contents written by `muxctx config` when no settings file exists yet.
pub const DEFAULT_CONFIG: &str = r#"# muxctx settings. Every key is optional.

[popup]
width = "80%"
height = "80%"
title = " muxctx "
border_color = "blue"

[completion]
# Shell used to compute completions (default: zsh on PATH).
# shell = "/usr/bin/zsh"
timeout_ms = 5000

[sessions]
# name | name-reverse | oldest | newest
sort = "name"
manifest = "~/.config/muxctx/sessions.yaml"
tmux_config_files = ["~/.tmux.conf", "~/.config/tmux/tmux.conf"]
ready_attempts = 200

[repositories]
roots = ["~/src"]
depth = 3
"#;

/// Session ordering used by the catalog.
///
/// Attached sessions always come first; the order applies within each group.
#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    /// Lexicographic by name.
    #[default]
    Name,
    /// Reverse lexicographic by name.
    NameReverse,
    /// Oldest session first.
    Oldest,
    /// Newest session first.
    Newest,
}

impl SortOrder {
    /// The next order, for cycling through them in the UI.
    pub fn next(self) -> Self {
        match self {
            SortOrder::Name => SortOrder::NameReverse,
            SortOrder::NameReverse => SortOrder::Oldest,
            SortOrder::Oldest => SortOrder::Newest,
            SortOrder::Newest => SortOrder::Name,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortOrder::Name => "name",
            SortOrder::NameReverse => "name-reverse",
            SortOrder::Oldest => "oldest",
            SortOrder::Newest => "newest",
        }
    }
}

/// Appearance of the `display-popup` that hosts interactive commands.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PopupSettings {
    pub width: String,
    pub height: String,
    pub title: String,
    pub border_color: String,
}

impl Default for PopupSettings {
    fn default() -> Self {
        PopupSettings {
            width: "80%".into(),
            height: "80%".into(),
            title: " muxctx ".into(),
            border_color: "blue".into(),
        }
    }
}

/// Completion engine settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompletionSettings {
    /// Shell binary; `zsh` from `PATH` when unset.
    pub shell: Option<PathBuf>,
    /// Hard deadline for one completion request.
    pub timeout_ms: u64,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        CompletionSettings {
            shell: None,
            timeout_ms: 5000,
        }
    }
}

/// Session catalog and persistence settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSettings {
    pub sort: SortOrder,
    /// YAML manifest written by `save` and read by `load`.
    pub manifest: PathBuf,
    /// Files sourced by `refresh`. Missing files are skipped.
    pub tmux_config_files: Vec<PathBuf>,
    /// Bound on the 10 ms polls while waiting for a fresh tmux server.
    pub ready_attempts: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            sort: SortOrder::default(),
            manifest: PathBuf::from("~/.config/muxctx/sessions.yaml"),
            tmux_config_files: vec![
                PathBuf::from("~/.tmux.conf"),
                PathBuf::from("~/.config/tmux/tmux.conf"),
            ],
            ready_attempts: 200,
        }
    }
}

/// Where the create picker looks for repositories.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepositorySettings {
    pub roots: Vec<PathBuf>,
    /// Maximum directory depth below each root.
    pub depth: usize,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        RepositorySettings {
            roots: vec![PathBuf::from("~/src")],
            depth: 3,
        }
    }
}

/// Top-level settings structure.
///
/// Parsed from `~/.config/muxctx/config.toml` (or XDG equivalent).
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub popup: PopupSettings,
    pub completion: CompletionSettings,
    pub sessions: SessionSettings,
    pub repositories: RepositorySettings,
}

impl Settings {
    /// Parse settings from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `toml::de::Error` if the TOML is malformed or doesn't match
    /// the expected structure.
    pub fn from_str(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Expand a leading `~` in every configured path against `home`.
    pub fn expand_paths(&mut self, home: &Path) {
        self.sessions.manifest = expand_tilde(&self.sessions.manifest, home);
        for path in &mut self.sessions.tmux_config_files {
            *path = expand_tilde(path, home);
        }
        for root in &mut self.repositories.roots {
            *root = expand_tilde(root, home);
        }
        if let Some(shell) = &mut self.completion.shell {
            *shell = expand_tilde(shell, home);
        }
    }
}

/// Replace a leading `~` component with `home`.
pub fn expand_tilde(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let settings = Settings::from_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.completion.timeout_ms, 5000);
        assert_eq!(settings.sessions.ready_attempts, 200);
    }

    #[test]
    fn test_default_config_template_parses() {
        let settings = Settings::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_partial_sections() {
        let toml = r##"
[sessions]
sort = "name-reverse"

[popup]
border_color = "#ff8800"
"##;
        let settings = Settings::from_str(toml).unwrap();
        assert_eq!(settings.sessions.sort, SortOrder::NameReverse);
        assert_eq!(settings.sessions.ready_attempts, 200);
        assert_eq!(settings.popup.border_color, "#ff8800");
        assert_eq!(settings.popup.width, "80%");
    }

    #[test]
    fn test_unknown_sort_is_error() {
        assert!(Settings::from_str("[sessions]\nsort = \"random\"\n").is_err());
    }

    #[test]
    fn test_expand_paths() {
        let mut settings = Settings::default();
        settings.completion.shell = Some(PathBuf::from("/bin/zsh"));
        settings.expand_paths(Path::new("/home/me"));
        assert_eq!(
            settings.sessions.manifest,
            PathBuf::from("/home/me/.config/muxctx/sessions.yaml")
        );
        assert_eq!(settings.repositories.roots, vec![PathBuf::from("/home/me/src")]);
        assert_eq!(settings.completion.shell, Some(PathBuf::from("/bin/zsh")));
    }

    #[test]
    fn test_expand_tilde_only_leading() {
        let home = Path::new("/h");
        assert_eq!(expand_tilde(Path::new("~"), home), PathBuf::from("/h"));
        assert_eq!(expand_tilde(Path::new("a/~"), home), PathBuf::from("a/~"));
        assert_eq!(expand_tilde(Path::new("~user/x"), home), PathBuf::from("~user/x"));
    }

    #[test]
    fn test_sort_cycle() {
        let mut order = SortOrder::Name;
        for _ in 0..4 {
            order = order.next();
        }
        assert_eq!(order, SortOrder::Name);
    }
}
