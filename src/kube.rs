//! Per-session kubeconfig files.
//!
//! Every read and write of kubeconfig files goes through [`KubeStore`]. The
//! store only ever touches two places under the home directory:
//!
//! - `~/.kube/config`, the conventional default file
//! - `~/.kube/config-<session>`, one isolated file per tmux session
//!
//! Writes always read, mutate and rewrite the whole file (see
//! [`KubeStore::modify`]) and replace it atomically. Callers serialize
//! writers; the coordinator holds a per-session lock around every mutation.
//!
//! Contexts are addressed by their *short name*: the full context name with
//! its first hyphen-delimited segment dropped, so `ctx1-prod` is `prod`.

use crate::error::{MuxctxError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Mapping;
use std::fs;
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

const FILE_MODE: u32 = 0o600;
const DIR_MODE: u32 = 0o700;

/// Treat an explicit `null` like a missing key; kubectl writes both.
fn nullable<'de, D, T>(d: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

fn default_api_version() -> String {
    "v1".into()
}

fn default_kind() -> String {
    "Config".into()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default)]
    pub server: String,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    #[serde(default)]
    pub cluster: Cluster,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    #[serde(default)]
    pub context: Context,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    #[serde(default)]
    pub user: serde_yaml::Value,
}

/// A kubeconfig document. Unknown keys are kept on rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubeConfig {
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,
    #[serde(default, deserialize_with = "nullable")]
    pub clusters: Vec<NamedCluster>,
    #[serde(default, deserialize_with = "nullable")]
    pub contexts: Vec<NamedContext>,
    #[serde(rename = "current-context", default, deserialize_with = "nullable")]
    pub current_context: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default, deserialize_with = "nullable")]
    pub preferences: Mapping,
    #[serde(default, deserialize_with = "nullable")]
    pub users: Vec<NamedUser>,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl Default for KubeConfig {
    /// The canonical empty skeleton.
    fn default() -> Self {
        KubeConfig {
            api_version: default_api_version(),
            clusters: Vec::new(),
            contexts: Vec::new(),
            current_context: String::new(),
            kind: default_kind(),
            preferences: Mapping::new(),
            users: Vec::new(),
            extra: Mapping::new(),
        }
    }
}

/// Drop the first hyphen-delimited segment of a context name.
pub fn short_name(full: &str) -> &str {
    full.split_once('-').map_or(full, |(_, rest)| rest)
}

impl KubeConfig {
    pub fn parse(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Ok(KubeConfig::default());
        }
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Full name of the context with short name (or full name) `name`.
    pub fn resolve(&self, name: &str) -> Result<&NamedContext> {
        self.contexts
            .iter()
            .find(|c| short_name(&c.name) == name)
            .or_else(|| self.contexts.iter().find(|c| c.name == name))
            .ok_or_else(|| MuxctxError::NotFound(format!("context {name}")))
    }

    fn resolve_mut(&mut self, name: &str) -> Result<&mut NamedContext> {
        let full = self.resolve(name)?.name.clone();
        self.contexts
            .iter_mut()
            .find(|c| c.name == full)
            .ok_or_else(|| MuxctxError::NotFound(format!("context {name}")))
    }

    pub fn cluster(&self, name: &str) -> Option<&NamedCluster> {
        self.clusters.iter().find(|c| c.name == name)
    }

    pub fn user(&self, name: &str) -> Option<&NamedUser> {
        self.users.iter().find(|u| u.name == name)
    }

    /// Remove a context and its user. The cluster goes too, unless another
    /// context still references it. Clears the current context if it was this one.
    pub fn remove_context(&mut self, name: &str) -> Result<NamedContext> {
        let full = self.resolve(name)?.name.clone();
        let idx = self
            .contexts
            .iter()
            .position(|c| c.name == full)
            .ok_or_else(|| MuxctxError::NotFound(format!("context {name}")))?;
        let removed = self.contexts.remove(idx);

        self.users.retain(|u| u.name != removed.context.user);
        let shared = self
            .contexts
            .iter()
            .any(|c| c.context.cluster == removed.context.cluster);
        if !shared {
            self.clusters.retain(|c| c.name != removed.context.cluster);
        }
        if self.current_context == removed.name {
            self.current_context.clear();
        }
        Ok(removed)
    }

    /// Insert or replace a context together with its cluster and user.
    pub fn upsert(
        &mut self,
        context: NamedContext,
        cluster: Option<NamedCluster>,
        user: Option<NamedUser>,
    ) {
        if let Some(cluster) = cluster {
            self.clusters.retain(|c| c.name != cluster.name);
            self.clusters.push(cluster);
        }
        if let Some(user) = user {
            self.users.retain(|u| u.name != user.name);
            self.users.push(user);
        }
        self.contexts.retain(|c| c.name != context.name);
        self.contexts.push(context);
    }

    /// Check that every context references an existing cluster and user, and
    /// that the current context exists.
    pub fn validate(&self) -> Result<()> {
        for ctx in &self.contexts {
            if self.cluster(&ctx.context.cluster).is_none() {
                return Err(MuxctxError::Malformed(format!(
                    "context {} references missing cluster {}",
                    ctx.name, ctx.context.cluster
                )));
            }
            if self.user(&ctx.context.user).is_none() {
                return Err(MuxctxError::Malformed(format!(
                    "context {} references missing user {}",
                    ctx.name, ctx.context.user
                )));
            }
        }
        if !self.current_context.is_empty()
            && !self.contexts.iter().any(|c| c.name == self.current_context)
        {
            return Err(MuxctxError::Malformed(format!(
                "current-context {} does not exist",
                self.current_context
            )));
        }
        Ok(())
    }
}

/// A context as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub short_name: String,
    pub user: String,
    pub host_url: String,
    pub namespace: String,
    pub is_current: bool,
    pub full_name: String,
}

/// Owner of the kubeconfig files under `<home>/.kube`.
#[derive(Debug, Clone)]
pub struct KubeStore {
    dir: PathBuf,
}

impl KubeStore {
    pub fn new(home: impl AsRef<Path>) -> Self {
        KubeStore {
            dir: home.as_ref().join(".kube"),
        }
    }

    /// Store rooted at the user's home directory.
    pub fn from_home() -> Result<Self> {
        dirs::home_dir()
            .map(KubeStore::new)
            .ok_or(MuxctxError::NoConfigDir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The conventional default kubeconfig.
    pub fn default_config(&self) -> PathBuf {
        self.dir.join("config")
    }

    /// Path of a session's kubeconfig. Path separators in the name become `_`.
    pub fn session_path(&self, session: &str) -> PathBuf {
        self.dir.join(format!("config-{}", session.replace(['/', '\\'], "_")))
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::DirBuilder::new()
                .recursive(true)
                .mode(DIR_MODE)
                .create(&self.dir)?;
        }
        Ok(())
    }

    /// Make sure the session's kubeconfig exists and return its path.
    ///
    /// Idempotent: an existing file is left untouched.
    pub fn create(&self, session: &str) -> Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.session_path(session);
        if path.exists() {
            return Ok(path);
        }
        let skeleton = KubeConfig::default().to_yaml()?;
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(FILE_MODE)
            .open(&path)
        {
            Ok(mut file) => {
                file.write_all(skeleton.as_bytes())?;
                info!(target: "muxctx::kube", "created {}", path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }
        Ok(path)
    }

    /// Remove the session's kubeconfig. A missing file is not an error.
    pub fn delete(&self, session: &str) -> Result<()> {
        let path = self.session_path(session);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(target: "muxctx::kube", "deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Move `config-<old>` to `config-<new>`, creating it if `old` had none.
    pub fn rename(&self, old: &str, new: &str) -> Result<PathBuf> {
        let from = self.session_path(old);
        let to = self.session_path(new);
        if to.exists() {
            return Err(MuxctxError::Conflict(to.display().to_string()));
        }
        if !from.exists() {
            return self.create(new);
        }
        fs::rename(&from, &to)?;
        Ok(to)
    }

    /// `(session, path)` of every per-session kubeconfig.
    pub fn session_configs(&self) -> Result<Vec<(String, PathBuf)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(session) = name.strip_prefix("config-") {
                out.push((session.to_string(), entry.path()));
            }
        }
        out.sort();
        Ok(out)
    }

    /// Delete the kubeconfigs of `sessions`. Other `config-*` files are never
    /// touched. Returns the sessions that had one.
    pub fn prune(&self, sessions: &[String]) -> Result<Vec<String>> {
        let mut pruned = Vec::new();
        for session in sessions {
            let path = self.session_path(session);
            match fs::remove_file(&path) {
                Ok(()) => pruned.push(session.clone()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(pruned)
    }

    pub fn load(&self, file: &Path) -> Result<KubeConfig> {
        KubeConfig::parse(&fs::read_to_string(file)?)
    }

    /// Read, mutate and atomically rewrite a kubeconfig.
    pub fn modify<T>(&self, file: &Path, f: impl FnOnce(&mut KubeConfig) -> Result<T>) -> Result<T> {
        let mut config = self.load(file)?;
        let out = f(&mut config)?;
        write_atomic(file, &config)?;
        Ok(out)
    }

    /// Contexts of a file, sorted by short name.
    pub fn list_contexts(&self, file: &Path) -> Result<Vec<ContextEntry>> {
        let config = self.load(file)?;
        let mut entries: Vec<ContextEntry> = config
            .contexts
            .iter()
            .map(|c| ContextEntry {
                short_name: short_name(&c.name).to_string(),
                user: c.context.user.clone(),
                host_url: config
                    .cluster(&c.context.cluster)
                    .map(|cl| cl.cluster.server.clone())
                    .unwrap_or_default(),
                namespace: if c.context.namespace.is_empty() {
                    "default".into()
                } else {
                    c.context.namespace.clone()
                },
                is_current: c.name == config.current_context,
                full_name: c.name.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.short_name.cmp(&b.short_name));
        Ok(entries)
    }

    pub fn set_current(&self, file: &Path, name: &str) -> Result<()> {
        self.modify(file, |config| {
            config.current_context = config.resolve(name)?.name.clone();
            Ok(())
        })
    }

    pub fn set_namespace(&self, file: &Path, name: &str, namespace: &str) -> Result<()> {
        self.modify(file, |config| {
            config.resolve_mut(name)?.context.namespace = namespace.to_string();
            Ok(())
        })
    }

    pub fn delete_context(&self, file: &Path, name: &str) -> Result<()> {
        self.modify(file, |config| config.remove_context(name).map(|_| ()))
    }

    /// Copy a context with its cluster and user into `dst`, then delete it
    /// from `src`. A no-op when both are the same file.
    pub fn move_context(&self, name: &str, src: &Path, dst: &Path) -> Result<()> {
        if src == dst {
            return Ok(());
        }
        let source = self.load(src)?;
        let context = source.resolve(name)?.clone();
        let cluster = source.cluster(&context.context.cluster).cloned();
        let user = source.user(&context.context.user).cloned();
        debug!(
            target: "muxctx::kube",
            "moving {} from {} to {}", context.name, src.display(), dst.display()
        );

        let full = context.name.clone();
        self.modify(dst, |config| {
            config.upsert(context, cluster, user);
            if config.current_context.is_empty() {
                config.current_context = full.clone();
            }
            Ok(())
        })?;
        self.modify(src, |config| config.remove_context(&full).map(|_| ()))
    }

    /// Namespaces of the cluster behind a context, via `kubectl`.
    pub fn list_namespaces(&self, file: &Path, name: &str) -> Result<Vec<String>> {
        let full = self.load(file)?.resolve(name)?.name.clone();
        let kubectl =
            which::which("kubectl").map_err(|_| MuxctxError::Unsupported("kubectl".into()))?;
        let file = file.to_string_lossy();
        let output = Command::new(kubectl)
            .args([
                "--kubeconfig",
                &file,
                "--context",
                &full,
                "get",
                "namespaces",
                "-o",
                "jsonpath={.items[*].metadata.name}",
            ])
            .output()?;
        if !output.status.success() {
            return Err(MuxctxError::exec("kubectl get namespaces", &output));
        }
        let mut namespaces: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .map(str::to_string)
            .collect();
        namespaces.sort();
        Ok(namespaces)
    }

    pub fn validate(&self, file: &Path) -> Result<()> {
        self.load(file)?.validate()
    }
}

/// Replace `path` with `config` through a temporary file in the same directory.
fn write_atomic(path: &Path, config: &KubeConfig) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(config.to_yaml()?.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(FILE_MODE))?;
    tmp.persist(path).map_err(|e| MuxctxError::Io(e.error))?;
    debug!(target: "muxctx::kube", "wrote {}", path.display());
    Ok(())
}
