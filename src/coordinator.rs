//! Cross-store operations on sessions and their kubeconfigs.
//!
//! Every user-initiated change flows through [`Coordinator`], which keeps
//! tmux (through the catalog) and the per-session kubeconfig files in step.
//! Operations on one session are serialized with a per-session lock;
//! operations touching two sessions take both locks in name order.
//! Failures are returned to the caller as-is.

use crate::config::{Settings, expand_tilde};
use crate::error::{MuxctxError, Result};
use crate::kube::{ContextEntry, KubeStore};
use crate::layout::Layout;
use crate::manifest::{Manifest, ManifestStore, PaneSpec, SessionSpec, WindowSpec};
use crate::session::{KUBECONFIG, Pane, Session, SessionManager, Window, blocking, is_shell};
use crate::tmux::{Multiplexer, NewSession, pane_target, window_target};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

/// Environment variable holding the command a session was created with.
pub const COMMAND: &str = "COMMAND";

/// Typed into panes by `refresh --send-vars`.
const EXPORT_KUBECONFIG: &str = "export $(tmux show-environment KUBECONFIG)";

const READY_POLL: Duration = Duration::from_millis(10);

/// Where the default session name is persisted.
pub trait DefaultSessionStore: Send + Sync {
    fn get(&self) -> Result<Option<String>>;
    fn set(&self, name: &str) -> Result<()>;
}

/// Asks the user to confirm a destructive action.
pub trait Dialog: Send + Sync {
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Something with a name that can be renamed in tmux.
pub trait Rename {
    fn name(&self) -> String;
    fn rename(&self, mux: &dyn Multiplexer, new_name: &str) -> Result<()>;

    /// The session whose identity changes with this rename, if any.
    fn session_name(&self) -> Option<&str> {
        None
    }
}

impl Rename for Session {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn rename(&self, mux: &dyn Multiplexer, new_name: &str) -> Result<()> {
        mux.rename_session(&self.name, new_name)
    }

    fn session_name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl Rename for Window {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn rename(&self, mux: &dyn Multiplexer, new_name: &str) -> Result<()> {
        mux.rename_window(&self.target(), new_name)
    }
}

impl Rename for Pane {
    fn name(&self) -> String {
        self.record.current_command.clone()
    }

    fn rename(&self, mux: &dyn Multiplexer, new_name: &str) -> Result<()> {
        mux.set_pane_title(&self.target(), new_name)
    }
}

/// A repository (or a bare name) to open a session for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoTarget {
    pub name: String,
    pub owner: Option<String>,
    pub path: PathBuf,
    pub command: Option<String>,
}

impl RepoTarget {
    /// Parse the `name:path:command` form used on the command line. Path
    /// defaults to the current directory and command to none. A relative
    /// path is taken from `cwd`; a leading `~` means the home directory.
    pub fn parse(arg: &str, cwd: &Path) -> Result<Self> {
        let mut parts = arg.splitn(3, ':');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(MuxctxError::Malformed(format!("session argument {arg:?}")));
        }
        let path = match parts.next().map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) if Path::new(p).starts_with("~") => {
                let home = dirs::home_dir().ok_or(MuxctxError::NoConfigDir)?;
                expand_tilde(Path::new(p), &home)
            }
            Some(p) => cwd.join(p),
            None => cwd.to_path_buf(),
        };
        let command = parts
            .next()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        Ok(RepoTarget {
            name: name.to_string(),
            owner: None,
            path,
            command,
        })
    }
}

/// tmux rewrites `.` and `:` in session names; do it up front so lookups match.
pub fn sanitize_session_name(name: &str) -> Result<String> {
    let name = name.trim().replace(['.', ':'], "_");
    if name.is_empty() {
        return Err(MuxctxError::Malformed("empty session name".into()));
    }
    Ok(name)
}

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Give every session its own kubeconfig.
    pub session_kubeconfig: bool,
    /// Files sourced by [`Coordinator::refresh`].
    pub tmux_config_files: Vec<PathBuf>,
    /// Bound on readiness polls after starting a tmux server.
    pub ready_attempts: u32,
    /// Our own executable name; its panes are left alone by `refresh`.
    pub program: String,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        CoordinatorOptions {
            session_kubeconfig: true,
            tmux_config_files: Vec::new(),
            ready_attempts: 200,
            program: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

impl CoordinatorOptions {
    pub fn new(settings: &Settings, manifest: &Manifest) -> Self {
        CoordinatorOptions {
            session_kubeconfig: manifest.create_session_kube_config,
            tmux_config_files: settings.sessions.tmux_config_files.clone(),
            ready_attempts: settings.sessions.ready_attempts,
            ..CoordinatorOptions::default()
        }
    }
}

pub struct Coordinator {
    sessions: Arc<SessionManager>,
    kube: KubeStore,
    defaults: Arc<dyn DefaultSessionStore>,
    options: CoordinatorOptions,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Coordinator {
    pub fn new(
        sessions: Arc<SessionManager>,
        kube: KubeStore,
        defaults: Arc<dyn DefaultSessionStore>,
        options: CoordinatorOptions,
    ) -> Self {
        Coordinator {
            sessions,
            kube,
            defaults,
            options,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn kube(&self) -> &KubeStore {
        &self.kube
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    fn session_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map holds an idle lock; nobody can be waiting on it.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    /// Lock every named session, in name order.
    async fn lock(&self, names: &[&str]) -> Vec<OwnedMutexGuard<()>> {
        let mut names = names.to_vec();
        names.sort_unstable();
        names.dedup();
        let mut guards = Vec::with_capacity(names.len());
        for name in names {
            guards.push(self.session_lock(name).lock_owned().await);
        }
        guards
    }

    async fn has_session(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.sessions.run(move |mux| mux.has_session(&name)).await
    }

    fn kubeconfig_env(&self, session: &str) -> Result<Option<(String, String)>> {
        if !self.options.session_kubeconfig {
            return Ok(None);
        }
        let path = self.kube.create(session)?;
        Ok(Some((KUBECONFIG.to_string(), path.to_string_lossy().into_owned())))
    }

    /// Ensure the session's kubeconfig exists and is exported to the session.
    async fn export_kubeconfig(&self, session: &str) -> Result<()> {
        if let Some((key, value)) = self.kubeconfig_env(session)? {
            let session = session.to_string();
            self.sessions
                .run(move |mux| mux.set_session_environment(&session, &key, &value))
                .await?;
        }
        Ok(())
    }

    /// Switch the client to `name`, recreating its kubeconfig if it went missing.
    pub async fn attach(&self, name: &str) -> Result<()> {
        let _guards = self.lock(&[name]).await;
        self.attach_locked(name).await
    }

    async fn attach_locked(&self, name: &str) -> Result<()> {
        self.export_kubeconfig(name).await?;
        let name = name.to_string();
        self.sessions.run(move |mux| mux.attach_session(&name)).await
    }

    /// Attach to the session for `target`, creating it if needed.
    ///
    /// A session named after the repository wins when its path matches, then
    /// `<owner>-<name>`. A new session takes the first of those names that is
    /// free. Returns the attached session's name.
    pub async fn create_or_attach(&self, target: &RepoTarget) -> Result<String> {
        let name = sanitize_session_name(&target.name)?;
        let owned = match target.owner.as_deref().map(str::trim) {
            Some(owner) if !owner.is_empty() => {
                Some(sanitize_session_name(&format!("{owner}-{}", target.name))?)
            }
            _ => None,
        };

        let candidates: Vec<&str> = std::iter::once(name.as_str())
            .chain(owned.as_deref())
            .collect();
        let _guards = self.lock(&candidates).await;

        let records = self.sessions.run(|mux| mux.list_sessions()).await?;
        let exists = |n: &str| records.iter().any(|r| r.name == n);
        let matches = |n: &str| records.iter().any(|r| r.name == n && r.path == target.path);

        for candidate in std::iter::once(&name).chain(owned.as_ref()) {
            if matches(candidate) {
                debug!(target: "muxctx::coordinator", "{candidate} already open at {}", target.path.display());
                self.attach_locked(candidate).await?;
                return Ok(candidate.clone());
            }
        }

        let new_name = if !exists(&name) {
            name
        } else {
            match owned {
                Some(owned) if !exists(&owned) => owned,
                Some(owned) => return Err(MuxctxError::Conflict(owned)),
                None => return Err(MuxctxError::Conflict(name)),
            }
        };

        let mut env: Vec<(String, String)> = self.kubeconfig_env(&new_name)?.into_iter().collect();
        let command = target.command.clone().filter(|c| !c.trim().is_empty());
        if let Some(command) = &command {
            env.push((COMMAND.to_string(), command.clone()));
        }
        let spec = NewSession {
            name: new_name.clone(),
            path: target.path.clone(),
            command,
            env,
        };
        self.sessions
            .run(move |mux| {
                mux.create_session(&spec)?;
                mux.attach_session(&spec.name)
            })
            .await?;
        info!(target: "muxctx::coordinator", "created {new_name} at {}", target.path.display());
        self.sessions.reload().await?;
        Ok(new_name)
    }

    /// Delete the session's kubeconfig, then kill it. Unless `force`, the
    /// user must confirm through `dialog` first.
    pub async fn kill(&self, session: &str, force: bool, dialog: &dyn Dialog) -> Result<()> {
        if !force && !dialog.confirm(&format!("Kill session {session}?"))? {
            return Err(MuxctxError::Cancelled);
        }
        let _guards = self.lock(&[session]).await;
        if !self.has_session(session).await? {
            return Err(MuxctxError::NotFound(format!("session {session}")));
        }
        if self.options.session_kubeconfig {
            self.kube.delete(session)?;
        }
        let preferred = self.defaults.get()?;
        self.sessions.kill_switch(session, preferred.as_deref()).await
    }

    /// Kill one window. Killing the last window ends the session, so that
    /// goes through [`Coordinator::kill`] to keep the kubeconfig in step.
    pub async fn kill_window(&self, session: &str, index: u32) -> Result<()> {
        let _guards = self.lock(&[session]).await;
        let target = window_target(session, index);
        let windows = {
            let session = session.to_string();
            self.sessions.run(move |mux| mux.list_windows(&session)).await?
        };
        if !windows.iter().any(|w| w.index == index) {
            return Err(MuxctxError::NotFound(format!("window {target}")));
        }
        if windows.len() == 1 {
            return Err(MuxctxError::Conflict(format!(
                "{target} is the last window of {session}"
            )));
        }
        self.sessions.run(move |mux| mux.kill_window(&target)).await?;
        self.sessions.reload().await
    }

    /// Rename a session, window or pane.
    ///
    /// Renaming a session also moves its kubeconfig and follows it as the
    /// default session.
    pub async fn rename<R>(&self, entity: &R, new_name: &str) -> Result<()>
    where
        R: Rename + Clone + Send + 'static,
    {
        let old_session = entity.session_name().map(str::to_string);
        let new_name = match old_session {
            Some(_) => sanitize_session_name(new_name)?,
            None if new_name.trim().is_empty() => {
                return Err(MuxctxError::Malformed("empty name".into()));
            }
            None => new_name.trim().to_string(),
        };

        let _guards = match &old_session {
            Some(old) => {
                if *old == new_name {
                    return Ok(());
                }
                let guards = self.lock(&[old.as_str(), new_name.as_str()]).await;
                if self.has_session(&new_name).await? {
                    return Err(MuxctxError::Conflict(new_name));
                }
                let stale = self.kube.session_path(&new_name);
                if self.options.session_kubeconfig && stale.exists() {
                    return Err(MuxctxError::Conflict(stale.display().to_string()));
                }
                guards
            }
            None => Vec::new(),
        };

        let entity = entity.clone();
        let renamed = new_name.clone();
        self.sessions
            .run(move |mux| entity.rename(mux, &renamed))
            .await?;

        if let Some(old) = old_session {
            info!(target: "muxctx::coordinator", "renamed session {old} to {new_name}");
            if self.options.session_kubeconfig {
                let path = match self.kube.rename(&old, &new_name) {
                    Ok(path) => path,
                    Err(e) => {
                        warn!(target: "muxctx::coordinator", "kubeconfig of {old}: {e}, renaming back");
                        let (from, to) = (new_name.clone(), old.clone());
                        self.sessions
                            .run(move |mux| mux.rename_session(&from, &to))
                            .await?;
                        self.sessions.reload().await?;
                        return Err(e);
                    }
                };
                let session = new_name.clone();
                self.sessions
                    .run(move |mux| {
                        mux.set_session_environment(&session, KUBECONFIG, &path.to_string_lossy())
                    })
                    .await?;
            }
            if self.defaults.get()?.as_deref() == Some(old.as_str()) {
                self.defaults.set(&new_name)?;
            }
        }
        self.sessions.reload().await
    }

    /// Move a context from one session's kubeconfig to another's, creating
    /// the destination session if it does not exist yet.
    pub async fn move_context(&self, context: &str, from: &str, to: &str) -> Result<()> {
        let to = sanitize_session_name(to)?;
        if from == to {
            return Ok(());
        }
        let _guards = self.lock(&[from, to.as_str()]).await;
        let src = self.kube.session_path(from);
        if !src.exists() {
            return Err(MuxctxError::NotFound(format!("kubeconfig of {from}")));
        }

        let dst = self.kube.create(&to)?;
        if !self.has_session(&to).await? {
            let path = self
                .sessions
                .get(from)
                .map(|s| s.path)
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("/"));
            let spec = NewSession {
                name: to.clone(),
                path,
                command: None,
                env: vec![(KUBECONFIG.to_string(), dst.to_string_lossy().into_owned())],
            };
            self.sessions.run(move |mux| mux.create_session(&spec)).await?;
            info!(target: "muxctx::coordinator", "created {to} to receive {context}");
        }

        let kube = self.kube.clone();
        let context_name = context.to_string();
        blocking(move || kube.move_context(&context_name, &src, &dst)).await?;
        info!(target: "muxctx::coordinator", "moved {context} from {from} to {to}");
        self.sessions.request_reload();
        Ok(())
    }

    /// Path of the session's kubeconfig, created if missing.
    pub fn session_kubeconfig(&self, session: &str) -> Result<PathBuf> {
        self.kube.create(session)
    }

    pub async fn list_contexts(&self, session: &str) -> Result<Vec<ContextEntry>> {
        let file = self.session_kubeconfig(session)?;
        let kube = self.kube.clone();
        blocking(move || kube.list_contexts(&file)).await
    }

    pub async fn set_context(&self, session: &str, context: &str) -> Result<()> {
        let _guards = self.lock(&[session]).await;
        let file = self.session_kubeconfig(session)?;
        let (kube, context) = (self.kube.clone(), context.to_string());
        blocking(move || kube.set_current(&file, &context)).await
    }

    pub async fn set_namespace(&self, session: &str, context: &str, namespace: &str) -> Result<()> {
        let _guards = self.lock(&[session]).await;
        let file = self.session_kubeconfig(session)?;
        let (kube, context, namespace) =
            (self.kube.clone(), context.to_string(), namespace.to_string());
        blocking(move || kube.set_namespace(&file, &context, &namespace)).await
    }

    pub async fn delete_context(&self, session: &str, context: &str) -> Result<()> {
        let _guards = self.lock(&[session]).await;
        let file = self.session_kubeconfig(session)?;
        let (kube, context) = (self.kube.clone(), context.to_string());
        blocking(move || kube.delete_context(&file, &context)).await
    }

    pub async fn list_namespaces(&self, session: &str, context: &str) -> Result<Vec<String>> {
        let file = self.session_kubeconfig(session)?;
        let (kube, context) = (self.kube.clone(), context.to_string());
        blocking(move || kube.list_namespaces(&file, &context)).await
    }

    /// Re-source the tmux config, optionally re-export every session's
    /// `KUBECONFIG`, and optionally push it into running panes.
    ///
    /// Pushing into panes is best effort: shells get an `export` line, other
    /// programs are suspended with `C-z`, sent the export and resumed with
    /// `fg`. Panes running muxctx itself are skipped.
    pub async fn refresh(&self, include_kubeconfig: bool, send_vars: bool) -> Result<()> {
        let files: Vec<PathBuf> = self
            .options
            .tmux_config_files
            .iter()
            .filter(|p| p.exists())
            .cloned()
            .collect();
        self.sessions
            .run(move |mux| {
                for file in &files {
                    if let Err(e) = mux.source_file(file) {
                        warn!(target: "muxctx::coordinator", "source-file {}: {e}", file.display());
                    }
                }
                Ok(())
            })
            .await?;

        self.sessions.reload().await?;
        if include_kubeconfig {
            self.sessions.update_environment(&self.kube).await?;
        }
        if send_vars {
            let panes: Vec<Pane> = self
                .sessions
                .snapshot()
                .iter()
                .flat_map(|s| s.windows.iter())
                .flat_map(|w| w.panes.iter().cloned())
                .collect();
            let program = self.options.program.clone();
            self.sessions
                .run(move |mux| {
                    for pane in &panes {
                        send_kubeconfig(mux, pane, &program);
                    }
                    Ok(())
                })
                .await?;
        }
        Ok(())
    }

    /// Rebuild sessions from a manifest.
    ///
    /// Starts tmux if it is not running. Each listed session is restored in
    /// parallel: missing windows and panes are created, existing ones are
    /// kept, and the saved layout is applied. Live sessions that are not in
    /// the manifest are killed afterwards, along with their kubeconfigs.
    pub async fn load(&self, manifest: &Manifest) -> Result<()> {
        if manifest.sessions.is_empty() {
            return Err(MuxctxError::NotFound("sessions in manifest".into()));
        }
        let names: Vec<String> = manifest.sessions.iter().map(|s| s.name.clone()).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let _guards = self.lock(&name_refs).await;

        self.bootstrap(&manifest.sessions[0]).await?;
        let pane_base = self.sessions.run(|mux| mux.pane_base_index()).await?;

        let kube = self.options.session_kubeconfig.then(|| self.kube.clone());
        let tasks = manifest.sessions.iter().cloned().map(|spec| {
            let kube = kube.clone();
            self.sessions
                .run(move |mux| restore_session(mux, &spec, kube.as_ref(), pane_base))
        });
        let mut first_error = None;
        for (spec, result) in manifest
            .sessions
            .iter()
            .zip(futures::future::join_all(tasks).await)
        {
            if let Err(e) = result {
                warn!(target: "muxctx::coordinator", "restoring {}: {e}", spec.name);
                first_error.get_or_insert(e);
            }
        }

        let keep = names.clone();
        let killed = self
            .sessions
            .run(move |mux| {
                let mut killed = Vec::new();
                for live in mux.list_sessions()? {
                    if !keep.contains(&live.name) {
                        info!(target: "muxctx::coordinator", "killing {} (not in manifest)", live.name);
                        mux.kill_session(&live.name)?;
                        killed.push(live.name);
                    }
                }
                Ok(killed)
            })
            .await?;
        if self.options.session_kubeconfig {
            for pruned in self.kube.prune(&killed)? {
                debug!(target: "muxctx::coordinator", "pruned kubeconfig of {pruned}");
            }
        }
        self.sessions.reload().await?;
        first_error.map_or(Ok(()), Err)
    }

    /// Start a tmux server with the first manifest session and wait for it.
    async fn bootstrap(&self, first: &SessionSpec) -> Result<()> {
        if self.sessions.run(|mux| Ok(mux.is_running())).await? {
            return Ok(());
        }
        info!(target: "muxctx::coordinator", "starting tmux with {}", first.name);
        let spec = NewSession {
            name: first.name.clone(),
            path: first.path.clone(),
            command: None,
            env: self.kubeconfig_env(&first.name)?.into_iter().collect(),
        };
        self.sessions.run(move |mux| mux.create_session(&spec)).await?;
        for _ in 0..self.options.ready_attempts {
            if self.sessions.run(|mux| Ok(mux.is_running())).await? {
                return Ok(());
            }
            tokio::time::sleep(READY_POLL).await;
        }
        Err(MuxctxError::Timeout("tmux server did not come up".into()))
    }

    /// Snapshot the live sessions into the manifest file.
    pub async fn save(&self, store: &ManifestStore) -> Result<Manifest> {
        self.sessions.reload().await?;
        let snapshot = self.sessions.snapshot();
        let names: Vec<String> = snapshot.iter().map(|s| s.name.clone()).collect();
        let commands = self
            .sessions
            .run(move |mux| {
                names
                    .iter()
                    .map(|n| Ok(mux.get_session_environment(n, COMMAND)?.unwrap_or_default()))
                    .collect::<Result<Vec<String>>>()
            })
            .await?;

        let mut manifest = store.load()?;
        manifest.sessions = snapshot
            .iter()
            .zip(commands)
            .map(|(session, command)| session_spec(session, command))
            .collect();
        store.save(&manifest)?;
        info!(
            target: "muxctx::coordinator",
            "saved {} sessions to {}", manifest.sessions.len(), store.path().display()
        );
        Ok(manifest)
    }
}

fn session_spec(session: &Session, command: String) -> SessionSpec {
    SessionSpec {
        name: session.name.clone(),
        path: session.path.clone(),
        command,
        windows: session
            .windows
            .iter()
            .map(|w| WindowSpec {
                index: w.index,
                name: w.name.clone(),
                layout: w.raw_layout.clone(),
                panes: w
                    .panes
                    .iter()
                    .map(|p| PaneSpec {
                        start_path: p.record.start_path.clone(),
                        current_path: p.record.current_path.clone(),
                        start_command: p.record.start_command.clone(),
                        current_command: p.record.current_command.clone(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn send_kubeconfig(mux: &dyn Multiplexer, pane: &Pane, program: &str) {
    let command = mux
        .pane_current_command(pane.id())
        .unwrap_or_else(|_| pane.record.current_command.clone());
    if command == program {
        return;
    }
    let target = pane.target();
    let result = if is_shell(&command) {
        mux.send_keys(&target, &[EXPORT_KUBECONFIG, "Enter"])
    } else {
        mux.send_keys(&target, &["C-z"])
            .and_then(|()| mux.send_keys(&target, &[EXPORT_KUBECONFIG, "Enter"]))
            .and_then(|()| mux.send_keys(&target, &["fg", "Enter"]))
    };
    if let Err(e) = result {
        warn!(target: "muxctx::coordinator", "sending KUBECONFIG to {target}: {e}");
    }
}

fn restore_session(
    mux: &dyn Multiplexer,
    spec: &SessionSpec,
    kube: Option<&KubeStore>,
    pane_base: u32,
) -> Result<()> {
    // window index -> implicit pane of windows created just now
    let mut fresh: HashMap<u32, u32> = HashMap::new();
    if !mux.has_session(&spec.name)? {
        let mut env = Vec::new();
        if let Some(kube) = kube {
            env.push((
                KUBECONFIG.to_string(),
                kube.create(&spec.name)?.to_string_lossy().into_owned(),
            ));
        }
        if !spec.command.is_empty() {
            env.push((COMMAND.to_string(), spec.command.clone()));
        }
        mux.create_session(&NewSession {
            name: spec.name.clone(),
            path: spec.path.clone(),
            command: None,
            env,
        })?;
        for window in mux.list_windows(&spec.name)? {
            let target = window_target(&spec.name, window.index);
            if let Some(pane) = mux.list_panes(&target)?.first() {
                fresh.insert(window.index, pane.id);
            }
        }
    }

    let mut windows = spec.windows.clone();
    windows.sort_by_key(|w| w.index);
    for window in &windows {
        restore_window(mux, spec, window, &mut fresh, pane_base)?;
    }
    Ok(())
}

fn pane_directory(pane: &PaneSpec, session: &SessionSpec) -> PathBuf {
    match pane.directory() {
        "" => session.path.clone(),
        dir => PathBuf::from(dir),
    }
}

fn restore_window(
    mux: &dyn Multiplexer,
    session: &SessionSpec,
    window: &WindowSpec,
    fresh: &mut HashMap<u32, u32>,
    pane_base: u32,
) -> Result<()> {
    let target = window_target(&session.name, window.index);
    let first_dir = window
        .panes
        .first()
        .map_or_else(|| session.path.clone(), |p| pane_directory(p, session));

    let implicit = match fresh.remove(&window.index) {
        Some(pane) => Some(pane),
        None if !mux.has_window(&session.name, window.index)? => {
            Some(mux.new_window(&session.name, window.index, &window.name, &first_dir)?)
        }
        None => None,
    };
    if !window.name.is_empty() {
        mux.rename_window(&target, &window.name)?;
    }

    let mut pane_ids = Vec::with_capacity(window.panes.len());
    for (i, pane) in window.panes.iter().enumerate() {
        let dir = pane_directory(pane, session);
        let command = Some(pane.start_command.as_str()).filter(|c| !c.is_empty());
        if let Some(implicit) = implicit {
            pane_ids.push(mux.split_window(&target, &dir, command)?);
            if i == 0 {
                mux.kill_pane(&pane_target(implicit))?;
            }
            continue;
        }

        let index = pane_base + i as u32;
        let live = if mux.has_pane(&target, index)? {
            mux.list_panes(&target)?.into_iter().find(|p| p.index == index)
        } else {
            None
        };
        match live {
            Some(live) => {
                if let Some(command) = command.filter(|_| is_shell(&live.current_command)) {
                    mux.respawn_pane(&pane_target(live.id), &dir, Some(command))?;
                }
                pane_ids.push(live.id);
            }
            None => pane_ids.push(mux.split_window(&target, &dir, command)?),
        }
    }

    apply_layout(mux, &target, &window.layout, &pane_ids);
    Ok(())
}

/// Apply a saved layout. If tmux rejects it, size each pane from the layout's
/// leaves instead.
fn apply_layout(mux: &dyn Multiplexer, target: &str, layout: &str, panes: &[u32]) {
    if layout.is_empty() {
        return;
    }
    let Err(e) = mux.select_layout(target, layout) else {
        return;
    };
    warn!(target: "muxctx::coordinator", "select-layout {target}: {e}");
    let Ok(parsed) = Layout::parse(layout) else {
        return;
    };
    for (leaf, pane) in parsed.leaves().into_iter().zip(panes) {
        let Ok(node) = parsed.find_pane(leaf) else {
            continue;
        };
        let g = node.geometry;
        if let Err(e) = mux.resize_pane(&pane_target(*pane), g.width, g.height) {
            warn!(target: "muxctx::coordinator", "resize-pane %{pane}: {e}");
        }
    }
}
