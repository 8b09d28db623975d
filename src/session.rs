//! In-memory catalog of tmux sessions.
//!
//! [`SessionManager::reload`] rebuilds the whole catalog from the multiplexer
//! (one blocking task per session) and swaps it in at once. Readers clone the
//! current `Arc` and never wait on a reload in progress.

use crate::config::SortOrder;
use crate::error::{MuxctxError, Result};
use crate::kube::KubeStore;
use crate::layout::Layout;
use crate::tmux::{
    Multiplexer, PaneRecord, SessionRecord, WindowFlags, pane_target, session_target,
    window_target,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub const KUBECONFIG: &str = "KUBECONFIG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pane {
    pub session: String,
    pub window: u32,
    pub record: PaneRecord,
}

impl Pane {
    pub fn id(&self) -> u32 {
        self.record.id
    }

    pub fn target(&self) -> String {
        pane_target(self.record.id)
    }

    /// Visible buffer of the pane, escape sequences included.
    pub fn capture(&self, mux: &dyn Multiplexer) -> Result<String> {
        mux.capture_pane(self.record.id, self.record.width)
    }
}

#[derive(Debug, Clone)]
pub struct Window {
    pub session: String,
    pub index: u32,
    pub name: String,
    pub flags: WindowFlags,
    pub active: bool,
    pub pane_count: usize,
    /// Layout string as reported by tmux.
    pub raw_layout: String,
    /// `None` if the layout string did not parse.
    pub layout: Option<Layout>,
    pub panes: Vec<Pane>,
}

impl Window {
    pub fn target(&self) -> String {
        window_target(&self.session, self.index)
    }

    /// Composite preview of every pane, or the first pane's buffer if the
    /// layout is unknown.
    pub fn preview(&self, mux: &dyn Multiplexer, border_color: Option<&str>) -> Result<String> {
        match &self.layout {
            Some(layout) => layout.render(mux, border_color),
            None => match self.panes.first() {
                Some(pane) => pane.capture(mux),
                None => Ok(String::new()),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub name: String,
    /// Seconds since the epoch.
    pub created: i64,
    pub attached: bool,
    pub window_count: usize,
    pub path: PathBuf,
    pub group: Option<String>,
    /// `KUBECONFIG` from the session environment.
    pub kubeconfig: Option<PathBuf>,
    pub windows: Vec<Window>,
}

impl Session {
    pub fn target(&self) -> String {
        session_target(&self.name)
    }

    pub fn window(&self, index: u32) -> Option<&Window> {
        self.windows.iter().find(|w| w.index == index)
    }
}

/// Catalog notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogEvent {
    /// A reload finished and the new catalog is visible.
    Ready,
    /// Something changed behind the catalog's back; listeners should reload.
    ReloadRequested,
}

/// Run blocking multiplexer or filesystem work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MuxctxError::Io(std::io::Error::other(e)))?
}

/// Order sessions: attached first, then by `order` within each group.
pub fn sort_sessions(sessions: &mut [Session], order: SortOrder) {
    sessions.sort_by(|a, b| {
        let by_order = match order {
            SortOrder::Name => a.name.cmp(&b.name),
            SortOrder::NameReverse => b.name.cmp(&a.name),
            SortOrder::Oldest => a.created.cmp(&b.created).then_with(|| a.name.cmp(&b.name)),
            SortOrder::Newest => b.created.cmp(&a.created).then_with(|| a.name.cmp(&b.name)),
        };
        b.attached.cmp(&a.attached).then(by_order)
    });
}

fn build_session(mux: &dyn Multiplexer, record: SessionRecord) -> Result<Session> {
    let mut windows = Vec::new();
    for w in mux.list_windows(&record.name)? {
        let target = window_target(&record.name, w.index);
        let raw_layout = mux.window_layout(&target)?;
        let layout = match Layout::parse(&raw_layout) {
            Ok(layout) => Some(layout),
            Err(e) => {
                warn!(target: "muxctx::session", "{target}: {e}");
                None
            }
        };
        let panes = mux
            .list_panes(&target)?
            .into_iter()
            .map(|pane| Pane {
                session: record.name.clone(),
                window: w.index,
                record: pane,
            })
            .collect();
        windows.push(Window {
            session: record.name.clone(),
            index: w.index,
            name: w.name,
            flags: w.flags,
            active: w.active,
            pane_count: w.panes,
            raw_layout,
            layout,
            panes,
        });
    }
    windows.sort_by_key(|w| w.index);

    let kubeconfig = mux
        .get_session_environment(&record.name, KUBECONFIG)?
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);

    Ok(Session {
        name: record.name,
        created: record.created,
        attached: record.attached,
        window_count: record.windows,
        path: record.path,
        group: record.group,
        kubeconfig,
        windows,
    })
}

/// Owner of the session catalog.
pub struct SessionManager {
    mux: Arc<dyn Multiplexer>,
    catalog: RwLock<Arc<Vec<Session>>>,
    sort: Mutex<SortOrder>,
    reload_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<CatalogEvent>,
}

impl SessionManager {
    pub fn new(mux: Arc<dyn Multiplexer>, sort: SortOrder) -> Self {
        let (events, _) = broadcast::channel(16);
        SessionManager {
            mux,
            catalog: RwLock::new(Arc::new(Vec::new())),
            sort: Mutex::new(sort),
            reload_lock: tokio::sync::Mutex::new(()),
            events,
        }
    }

    pub fn mux(&self) -> &Arc<dyn Multiplexer> {
        &self.mux
    }

    /// Run `f` against the multiplexer on a blocking task.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn Multiplexer) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mux = Arc::clone(&self.mux);
        blocking(move || f(mux.as_ref())).await
    }

    /// Rebuild the catalog from tmux and emit [`CatalogEvent::Ready`].
    ///
    /// Sessions that disappear while being listed are left out.
    pub async fn reload(&self) -> Result<()> {
        let _guard = self.reload_lock.lock().await;
        let records = self.run(|mux| mux.list_sessions()).await?;

        let tasks = records.into_iter().map(|record| {
            let name = record.name.clone();
            let build = self.run(move |mux| build_session(mux, record));
            async move { (name, build.await) }
        });
        let mut sessions = Vec::new();
        for (name, built) in futures::future::join_all(tasks).await {
            match built {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(target: "muxctx::session", "skipping {name}: {e}"),
            }
        }
        debug!(target: "muxctx::session", "catalog holds {} sessions", sessions.len());

        *self.catalog.write().map_err(|_| poisoned())? = Arc::new(sessions);
        let _ = self.events.send(CatalogEvent::Ready);
        Ok(())
    }

    /// The current catalog, in tmux order.
    pub fn snapshot(&self) -> Arc<Vec<Session>> {
        match self.catalog.read() {
            Ok(catalog) => Arc::clone(&catalog),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn get(&self, name: &str) -> Option<Session> {
        self.snapshot().iter().find(|s| s.name == name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.snapshot().iter().any(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Sessions in display order.
    pub fn items(&self) -> Vec<Session> {
        let mut sessions = self.snapshot().as_ref().clone();
        sort_sessions(&mut sessions, self.sort());
        sessions
    }

    pub fn sort(&self) -> SortOrder {
        self.sort.lock().map_or(SortOrder::default(), |s| *s)
    }

    pub fn set_sort(&self, order: SortOrder) {
        if let Ok(mut sort) = self.sort.lock() {
            *sort = order;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.events.subscribe()
    }

    pub fn request_reload(&self) {
        let _ = self.events.send(CatalogEvent::ReloadRequested);
    }

    /// Kill `old`. If it is the attached session, first move the client to
    /// `preferred`, or to the oldest surviving session when `preferred` does
    /// not exist.
    pub async fn kill_switch(&self, old: &str, preferred: Option<&str>) -> Result<()> {
        let catalog_attached = self.get(old).is_some_and(|s| s.attached);
        let old = old.to_string();
        let preferred = preferred.map(str::to_string);

        self.run(move |mux| {
            let attached = match mux.current_session() {
                Some(current) => current == old,
                None => catalog_attached,
            };
            if attached {
                let survivors: Vec<SessionRecord> = mux
                    .list_sessions()?
                    .into_iter()
                    .filter(|s| s.name != old)
                    .collect();
                let target = preferred
                    .filter(|p| survivors.iter().any(|s| &s.name == p))
                    .or_else(|| {
                        survivors
                            .iter()
                            .min_by(|a, b| a.created.cmp(&b.created).then(a.name.cmp(&b.name)))
                            .map(|s| s.name.clone())
                    });
                if let Some(target) = target {
                    info!(target: "muxctx::session", "switching from {old} to {target}");
                    mux.attach_session(&target)?;
                }
            }
            mux.kill_session(&old)?;
            info!(target: "muxctx::session", "killed {old}");
            Ok(())
        })
        .await?;
        self.reload().await
    }

    /// Ensure every session has its kubeconfig and export it as `KUBECONFIG`.
    pub async fn update_environment(&self, kube: &KubeStore) -> Result<()> {
        let names: Vec<String> = self.snapshot().iter().map(|s| s.name.clone()).collect();
        let kube = kube.clone();
        self.run(move |mux| {
            for name in names {
                let path = kube.create(&name)?;
                mux.set_session_environment(&name, KUBECONFIG, &path.to_string_lossy())?;
            }
            Ok(())
        })
        .await?;
        self.reload().await
    }
}

fn poisoned() -> MuxctxError {
    MuxctxError::Io(std::io::Error::other("session catalog lock poisoned"))
}

/// Whether `command` names an interactive shell.
pub fn is_shell(command: &str) -> bool {
    let name = command.rsplit('/').next().unwrap_or(command);
    let name = name.strip_prefix('-').unwrap_or(name);
    matches!(name, "sh" | "bash" | "zsh" | "fish" | "dash" | "ksh" | "tcsh" | "csh" | "nu")
}

/// `index: name` with tmux-style window flags.
pub fn window_label(window: &Window) -> String {
    if window.flags.is_empty() {
        format!("{}: {}", window.index, window.name)
    } else {
        format!("{}: {}{}", window.index, window.name, window.flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMux;
    use tempfile::TempDir;

    fn manager(mux: &Arc<FakeMux>) -> SessionManager {
        SessionManager::new(mux.clone(), SortOrder::Name)
    }

    #[tokio::test]
    async fn test_reload_builds_windows_and_layouts() {
        let mux = Arc::new(FakeMux::new());
        mux.add_session("api", "/src/api");
        mux.set_session_environment("api", KUBECONFIG, "/h/.kube/config-api")
            .unwrap();
        let sessions = manager(&mux);
        sessions.reload().await.unwrap();

        let api = sessions.get("api").unwrap();
        assert_eq!(api.path, PathBuf::from("/src/api"));
        assert_eq!(api.kubeconfig, Some(PathBuf::from("/h/.kube/config-api")));
        assert_eq!(api.windows.len(), 1);
        let window = &api.windows[0];
        assert_eq!(window.panes.len(), 1);
        assert_eq!(window.panes[0].session, "api");
        let layout = window.layout.as_ref().unwrap();
        assert_eq!(layout.leaves(), vec![window.panes[0].id()]);
        assert!(layout.verify());
    }

    #[tokio::test]
    async fn test_catalog_matches_multiplexer() {
        let mux = Arc::new(FakeMux::new());
        for name in ["a", "b", "c"] {
            mux.add_session(name, "/tmp");
        }
        let sessions = manager(&mux);
        sessions.reload().await.unwrap();
        mux.kill_session("b").unwrap();
        sessions.reload().await.unwrap();

        assert_eq!(sessions.len(), 2);
        for session in sessions.items() {
            assert!(mux.has_session(&session.name).unwrap());
        }
    }

    #[tokio::test]
    async fn test_items_attached_first_then_order() {
        let mux = Arc::new(FakeMux::new());
        for name in ["b", "c", "a", "d"] {
            mux.add_session(name, "/tmp");
        }
        mux.attach("c");
        let sessions = manager(&mux);
        sessions.reload().await.unwrap();

        let names = |s: &SessionManager| -> Vec<String> {
            s.items().into_iter().map(|s| s.name).collect()
        };
        assert_eq!(names(&sessions), vec!["c", "a", "b", "d"]);
        sessions.set_sort(SortOrder::NameReverse);
        assert_eq!(names(&sessions), vec!["c", "d", "b", "a"]);
        sessions.set_sort(SortOrder::Oldest);
        assert_eq!(names(&sessions), vec!["c", "b", "a", "d"]);
        sessions.set_sort(SortOrder::Newest);
        assert_eq!(names(&sessions), vec!["c", "d", "a", "b"]);
    }

    #[tokio::test]
    async fn test_kill_switch_falls_back_to_oldest() {
        let mux = Arc::new(FakeMux::new());
        for name in ["s1", "s2", "s3"] {
            mux.add_session(name, "/tmp");
        }
        mux.attach("s2");
        let sessions = manager(&mux);
        sessions.reload().await.unwrap();

        sessions
            .kill_switch("s2", Some("does-not-exist"))
            .await
            .unwrap();

        assert_eq!(mux.client().as_deref(), Some("s1"));
        assert!(!sessions.has("s2"));
        let calls = mux.calls();
        let attach = calls.iter().position(|c| c == "attach s1").unwrap();
        let kill = calls.iter().position(|c| c == "kill-session s2").unwrap();
        assert!(attach < kill);
    }

    #[tokio::test]
    async fn test_kill_switch_prefers_existing_target() {
        let mux = Arc::new(FakeMux::new());
        for name in ["s1", "s2", "s3"] {
            mux.add_session(name, "/tmp");
        }
        mux.attach("s2");
        let sessions = manager(&mux);
        sessions.kill_switch("s2", Some("s3")).await.unwrap();
        assert_eq!(mux.client().as_deref(), Some("s3"));
    }

    #[tokio::test]
    async fn test_kill_switch_detached_does_not_move_client() {
        let mux = Arc::new(FakeMux::new());
        for name in ["s1", "s2"] {
            mux.add_session(name, "/tmp");
        }
        mux.attach("s1");
        let sessions = manager(&mux);
        sessions.kill_switch("s2", None).await.unwrap();
        assert_eq!(mux.client().as_deref(), Some("s1"));
        assert!(!mux.calls().iter().any(|c| c.starts_with("attach")));
    }

    #[tokio::test]
    async fn test_update_environment_creates_configs() {
        let home = TempDir::new().unwrap();
        let kube = KubeStore::new(home.path());
        let mux = Arc::new(FakeMux::new());
        mux.add_session("api", "/tmp");
        mux.add_session("web", "/tmp");
        let sessions = manager(&mux);
        sessions.reload().await.unwrap();

        sessions.update_environment(&kube).await.unwrap();

        for name in ["api", "web"] {
            let path = kube.session_path(name);
            assert!(path.exists());
            assert_eq!(mux.env(name, KUBECONFIG), Some(path.to_string_lossy().into_owned()));
            assert_eq!(sessions.get(name).unwrap().kubeconfig, Some(path));
        }
    }

    #[tokio::test]
    async fn test_reload_emits_ready() {
        let mux = Arc::new(FakeMux::new());
        let sessions = manager(&mux);
        let mut events = sessions.subscribe();
        sessions.reload().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), CatalogEvent::Ready);
        sessions.request_reload();
        assert_eq!(events.recv().await.unwrap(), CatalogEvent::ReloadRequested);
    }

    #[test]
    fn test_is_shell() {
        assert!(is_shell("zsh"));
        assert!(is_shell("-bash"));
        assert!(is_shell("/usr/bin/fish"));
        assert!(!is_shell("nvim"));
        assert!(!is_shell("kubectl"));
    }
}
