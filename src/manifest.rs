//! Persisted session manifest.
//!
//! `save` snapshots the live sessions into a YAML file and `load` rebuilds
//! them from it. The same file carries the default session, which the
//! coordinator reads and writes through [`DefaultSessionStore`].
//!
//! ```yaml
//! defaultSession: api
//! createSessionKubeConfig: true
//! manageSessionKubeContext: true
//! sessions:
//!   - name: api
//!     path: /home/me/src/api
//!     command: ""
//!     windows:
//!       - index: 1
//!         name: editor
//!         layout: "b25d,80x24,0,0,1"
//!         panes:
//!           - startPath: /home/me/src/api
//!             currentPath: /home/me/src/api/cmd
//!             startCommand: ""
//!             currentCommand: nvim
//! ```

use crate::coordinator::DefaultSessionStore;
use crate::error::{MuxctxError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub default_session: String,
    /// Give every session its own kubeconfig file.
    #[serde(default = "enabled")]
    pub create_session_kube_config: bool,
    /// Expose context management for sessions in the UI.
    #[serde(default = "enabled")]
    pub manage_session_kube_context: bool,
    #[serde(default)]
    pub sessions: Vec<SessionSpec>,
}

impl Default for Manifest {
    fn default() -> Self {
        Manifest {
            default_session: String::new(),
            create_session_kube_config: true,
            manage_session_kube_context: true,
            sessions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSpec {
    pub name: String,
    pub path: PathBuf,
    pub command: String,
    pub windows: Vec<WindowSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WindowSpec {
    pub index: u32,
    pub name: String,
    /// Raw tmux layout string.
    pub layout: String,
    pub panes: Vec<PaneSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaneSpec {
    pub start_path: String,
    pub current_path: String,
    pub start_command: String,
    pub current_command: String,
}

impl PaneSpec {
    /// Directory a recreated pane should start in.
    pub fn directory(&self) -> &str {
        if self.start_path.is_empty() {
            &self.current_path
        } else {
            &self.start_path
        }
    }
}

impl Manifest {
    pub fn parse(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Ok(Manifest::default());
        }
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn session(&self, name: &str) -> Option<&SessionSpec> {
        self.sessions.iter().find(|s| s.name == name)
    }
}

/// The manifest file. Every update is a read-modify-write of the whole file.
#[derive(Debug)]
pub struct ManifestStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ManifestStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the manifest; a missing file is an empty manifest.
    pub fn load(&self) -> Result<Manifest> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Manifest::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Manifest::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, manifest: &Manifest) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        self.write(manifest)
    }

    pub fn update<T>(&self, f: impl FnOnce(&mut Manifest) -> T) -> Result<T> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        let mut manifest = self.load()?;
        let out = f(&mut manifest);
        self.write(&manifest)?;
        Ok(out)
    }

    fn write(&self, manifest: &Manifest) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(manifest.to_yaml()?.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| MuxctxError::Io(e.error))?;
        debug!(target: "muxctx::manifest", "wrote {}", self.path.display());
        Ok(())
    }
}

fn poisoned() -> MuxctxError {
    MuxctxError::Io(std::io::Error::other("manifest lock poisoned"))
}

impl DefaultSessionStore for ManifestStore {
    fn get(&self) -> Result<Option<String>> {
        let name = self.load()?.default_session;
        Ok((!name.is_empty()).then_some(name))
    }

    fn set(&self, name: &str) -> Result<()> {
        self.update(|m| m.default_session = name.to_string())
    }
}
