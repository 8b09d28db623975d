//! In-memory multiplexer double for unit tests.

use crate::error::{MuxctxError, Result};
use crate::layout;
use crate::tmux::{
    Menu, Multiplexer, NewSession, PaneRecord, Popup, SessionRecord, WindowFlags, WindowRecord,
};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct FakePane {
    id: u32,
    start_path: String,
    start_command: String,
}

#[derive(Debug, Clone)]
struct FakeWindow {
    index: u32,
    name: String,
    panes: Vec<FakePane>,
    layout: Option<String>,
}

#[derive(Debug, Clone)]
struct FakeSession {
    name: String,
    path: PathBuf,
    created: i64,
    env: BTreeMap<String, String>,
    windows: Vec<FakeWindow>,
}

#[derive(Debug, Default)]
struct State {
    sessions: Vec<FakeSession>,
    client: Option<String>,
    next_pane: u32,
    clock: i64,
    running: bool,
    base_index: u32,
    captures: HashMap<u32, String>,
    commands: HashMap<u32, String>,
    calls: Vec<String>,
}

impl State {
    fn session(&self, name: &str) -> Result<&FakeSession> {
        self.sessions
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| no_such(name))
    }

    fn session_mut(&mut self, name: &str) -> Result<&mut FakeSession> {
        self.sessions
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| no_such(name))
    }

    fn window_mut(&mut self, target: &str) -> Result<&mut FakeWindow> {
        let (session, index) = split_target(target).ok_or_else(|| no_such(target))?;
        self.session_mut(&session)?
            .windows
            .iter_mut()
            .find(|w| w.index == index)
            .ok_or_else(|| no_such(target))
    }

    fn pane_id(&mut self) -> u32 {
        let id = self.next_pane;
        self.next_pane += 1;
        id
    }

    fn new_pane(&mut self, path: &Path, command: Option<&str>) -> FakePane {
        FakePane {
            id: self.pane_id(),
            start_path: path.to_string_lossy().into_owned(),
            start_command: command.unwrap_or_default().to_string(),
        }
    }

    /// Window holding a pane, as (session index, window index).
    fn locate_pane(&self, id: u32) -> Option<(usize, usize)> {
        self.sessions.iter().enumerate().find_map(|(si, s)| {
            s.windows
                .iter()
                .position(|w| w.panes.iter().any(|p| p.id == id))
                .map(|wi| (si, wi))
        })
    }

    fn drop_empty(&mut self) {
        for s in &mut self.sessions {
            s.windows.retain(|w| !w.panes.is_empty());
        }
        let client = self.client.clone();
        self.sessions.retain(|s| !s.windows.is_empty());
        if let Some(c) = client {
            if !self.sessions.iter().any(|s| s.name == c) {
                self.client = None;
            }
        }
    }
}

fn no_such(what: &str) -> MuxctxError {
    MuxctxError::Exec {
        stdout: String::new(),
        stderr: format!("can't find {what}"),
        cause: "fake".into(),
    }
}

fn split_target(target: &str) -> Option<(String, u32)> {
    let (session, index) = target.strip_prefix('=')?.rsplit_once(':')?;
    Some((session.to_string(), index.parse().ok()?))
}

fn pane_of(target: &str) -> Option<u32> {
    target.strip_prefix('%')?.parse().ok()
}

/// Multiplexer double with tmux-like semantics, recording every mutation.
pub(crate) struct FakeMux {
    state: Mutex<State>,
}

impl FakeMux {
    pub fn new() -> Self {
        FakeMux {
            state: Mutex::new(State {
                running: true,
                clock: 1_700_000_000,
                ..State::default()
            }),
        }
    }

    /// A server with no sessions that is not running yet.
    pub fn stopped() -> Self {
        let mux = FakeMux::new();
        mux.state.lock().unwrap().running = false;
        mux
    }

    /// Add a session with one window and one pane. Later sessions are newer.
    pub fn add_session(&self, name: &str, path: &str) {
        let mut st = self.state.lock().unwrap();
        st.clock += 10;
        let created = st.clock;
        let base = st.base_index;
        let pane = st.new_pane(Path::new(path), None);
        st.sessions.push(FakeSession {
            name: name.to_string(),
            path: PathBuf::from(path),
            created,
            env: BTreeMap::new(),
            windows: vec![FakeWindow {
                index: base,
                name: "zsh".into(),
                panes: vec![pane],
                layout: None,
            }],
        });
    }

    pub fn attach(&self, name: &str) {
        self.state.lock().unwrap().client = Some(name.to_string());
    }

    pub fn set_capture(&self, pane: u32, text: &str) {
        self.state.lock().unwrap().captures.insert(pane, text.to_string());
    }

    pub fn set_command(&self, pane: u32, command: &str) {
        self.state.lock().unwrap().commands.insert(pane, command.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn session_names(&self) -> Vec<String> {
        self.state.lock().unwrap().sessions.iter().map(|s| s.name.clone()).collect()
    }

    pub fn session_path(&self, name: &str) -> Option<PathBuf> {
        let st = self.state.lock().unwrap();
        st.session(name).ok().map(|s| s.path.clone())
    }

    pub fn env(&self, session: &str, key: &str) -> Option<String> {
        let st = self.state.lock().unwrap();
        st.session(session).ok().and_then(|s| s.env.get(key).cloned())
    }

    pub fn client(&self) -> Option<String> {
        self.state.lock().unwrap().client.clone()
    }

    /// Pane ids of a window, in order.
    pub fn panes(&self, session: &str, index: u32) -> Vec<u32> {
        let st = self.state.lock().unwrap();
        st.session(session)
            .ok()
            .and_then(|s| s.windows.iter().find(|w| w.index == index))
            .map(|w| w.panes.iter().map(|p| p.id).collect())
            .unwrap_or_default()
    }

    pub fn window_indices(&self, session: &str) -> Vec<u32> {
        let st = self.state.lock().unwrap();
        st.session(session)
            .map(|s| s.windows.iter().map(|w| w.index).collect())
            .unwrap_or_default()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn even_layout(panes: &[FakePane]) -> String {
    let body = match panes {
        [only] => format!("80x24,0,0,{}", only.id),
        _ => {
            let width = 80 / panes.len() as u32;
            let children: Vec<String> = panes
                .iter()
                .enumerate()
                .map(|(i, p)| format!("{width}x24,{},0,{}", i as u32 * width, p.id))
                .collect();
            format!("80x24,0,0{{{}}}", children.join(","))
        }
    };
    format!("{:04x},{body}", layout::checksum(&body))
}

impl Multiplexer for FakeMux {
    fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let st = self.state.lock().unwrap();
        Ok(st
            .sessions
            .iter()
            .map(|s| SessionRecord {
                name: s.name.clone(),
                windows: s.windows.len(),
                created: s.created,
                attached: st.client.as_deref() == Some(s.name.as_str()),
                group: None,
                path: s.path.clone(),
            })
            .collect())
    }

    fn list_windows(&self, session: &str) -> Result<Vec<WindowRecord>> {
        let st = self.state.lock().unwrap();
        Ok(st
            .session(session)?
            .windows
            .iter()
            .enumerate()
            .map(|(i, w)| WindowRecord {
                index: w.index,
                flags: if i == 0 {
                    WindowFlags::CURRENT
                } else {
                    WindowFlags::default()
                },
                name: w.name.clone(),
                active: i == 0,
                panes: w.panes.len(),
            })
            .collect())
    }

    fn list_panes(&self, target: &str) -> Result<Vec<PaneRecord>> {
        let mut st = self.state.lock().unwrap();
        let commands = st.commands.clone();
        let window = st.window_mut(target)?;
        Ok(window
            .panes
            .iter()
            .enumerate()
            .map(|(i, p)| PaneRecord {
                id: p.id,
                index: i as u32,
                width: 80,
                height: 24,
                active: i == 0,
                current_command: commands.get(&p.id).cloned().unwrap_or_else(|| "zsh".into()),
                current_path: p.start_path.clone(),
                start_path: p.start_path.clone(),
                start_command: p.start_command.clone(),
                ..PaneRecord::default()
            })
            .collect())
    }

    fn window_layout(&self, target: &str) -> Result<String> {
        let mut st = self.state.lock().unwrap();
        let window = st.window_mut(target)?;
        Ok(window.layout.clone().unwrap_or_else(|| even_layout(&window.panes)))
    }

    fn capture_pane(&self, pane: u32, _width: u32) -> Result<String> {
        Ok(self.state.lock().unwrap().captures.get(&pane).cloned().unwrap_or_default())
    }

    fn pane_current_command(&self, pane: u32) -> Result<String> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .commands
            .get(&pane)
            .cloned()
            .unwrap_or_else(|| "zsh".into()))
    }

    fn create_session(&self, spec: &NewSession) -> Result<()> {
        {
            let mut st = self.state.lock().unwrap();
            if st.session(&spec.name).is_ok() {
                return Err(MuxctxError::Exec {
                    stdout: String::new(),
                    stderr: format!("duplicate session: {}", spec.name),
                    cause: "new-session".into(),
                });
            }
            st.running = true;
        }
        self.add_session(&spec.name, &spec.path.to_string_lossy());
        let mut st = self.state.lock().unwrap();
        let session = st.session_mut(&spec.name)?;
        session.env.extend(spec.env.iter().cloned());
        let command = spec.command.clone().unwrap_or_default();
        st.calls.push(format!("new-session {} {}", spec.name, command).trim_end().to_string());
        Ok(())
    }

    fn attach_session(&self, name: &str) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.session(name)?;
        st.client = Some(name.to_string());
        st.calls.push(format!("attach {name}"));
        Ok(())
    }

    fn kill_session(&self, name: &str) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.session(name)?;
        st.sessions.retain(|s| s.name != name);
        if st.client.as_deref() == Some(name) {
            st.client = None;
        }
        st.calls.push(format!("kill-session {name}"));
        Ok(())
    }

    fn kill_window(&self, target: &str) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.window_mut(target)?.panes.clear();
        st.drop_empty();
        st.calls.push(format!("kill-window {target}"));
        Ok(())
    }

    fn kill_pane(&self, target: &str) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        let id = pane_of(target).ok_or_else(|| no_such(target))?;
        let (si, wi) = st.locate_pane(id).ok_or_else(|| no_such(target))?;
        st.sessions[si].windows[wi].panes.retain(|p| p.id != id);
        st.drop_empty();
        st.calls.push(format!("kill-pane {target}"));
        Ok(())
    }

    fn rename_session(&self, old: &str, new: &str) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if st.session(new).is_ok() {
            return Err(no_such(new));
        }
        st.session_mut(old)?.name = new.to_string();
        if st.client.as_deref() == Some(old) {
            st.client = Some(new.to_string());
        }
        st.calls.push(format!("rename-session {old} {new}"));
        Ok(())
    }

    fn rename_window(&self, target: &str, new: &str) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.window_mut(target)?.name = new.to_string();
        st.calls.push(format!("rename-window {target} {new}"));
        Ok(())
    }

    fn set_pane_title(&self, target: &str, title: &str) -> Result<()> {
        self.record(format!("select-pane {target} -T {title}"));
        Ok(())
    }

    fn set_session_environment(&self, session: &str, key: &str, value: &str) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.session_mut(session)?.env.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_session_environment(&self, session: &str, key: &str) -> Result<Option<String>> {
        let st = self.state.lock().unwrap();
        Ok(st.session(session)?.env.get(key).cloned())
    }

    fn has_session(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().session(name).is_ok())
    }

    fn has_window(&self, session: &str, index: u32) -> Result<bool> {
        let st = self.state.lock().unwrap();
        Ok(st
            .session(session)
            .is_ok_and(|s| s.windows.iter().any(|w| w.index == index)))
    }

    fn has_pane(&self, window: &str, index: u32) -> Result<bool> {
        let mut st = self.state.lock().unwrap();
        Ok(st
            .window_mut(window)
            .is_ok_and(|w| (index as usize) < w.panes.len()))
    }

    fn current_session(&self) -> Option<String> {
        self.client()
    }

    fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    fn new_window(&self, session: &str, index: u32, name: &str, path: &Path) -> Result<u32> {
        let mut st = self.state.lock().unwrap();
        st.session(session)?;
        let pane = st.new_pane(path, None);
        let id = pane.id;
        let s = st.session_mut(session)?;
        s.windows.push(FakeWindow {
            index,
            name: name.to_string(),
            panes: vec![pane],
            layout: None,
        });
        s.windows.sort_by_key(|w| w.index);
        st.calls.push(format!("new-window {session}:{index} {name}"));
        Ok(id)
    }

    fn split_window(&self, target: &str, path: &Path, command: Option<&str>) -> Result<u32> {
        let mut st = self.state.lock().unwrap();
        let pane = st.new_pane(path, command);
        let id = pane.id;
        st.window_mut(target)?.panes.push(pane);
        st.calls.push(format!("split-window {target} {}", path.display()));
        Ok(id)
    }

    fn respawn_pane(&self, target: &str, path: &Path, _command: Option<&str>) -> Result<()> {
        self.record(format!("respawn-pane {target} {}", path.display()));
        Ok(())
    }

    fn source_file(&self, path: &Path) -> Result<()> {
        self.record(format!("source-file {}", path.display()));
        Ok(())
    }

    fn send_keys(&self, target: &str, keys: &[&str]) -> Result<()> {
        self.record(format!("send-keys {target} {}", keys.join(" ")));
        Ok(())
    }

    fn select_layout(&self, target: &str, layout: &str) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.window_mut(target)?.layout = Some(layout.to_string());
        st.calls.push(format!("select-layout {target} {layout}"));
        Ok(())
    }

    fn resize_pane(&self, target: &str, width: u32, height: u32) -> Result<()> {
        self.record(format!("resize-pane {target} {width}x{height}"));
        Ok(())
    }

    fn base_index(&self) -> Result<u32> {
        Ok(self.state.lock().unwrap().base_index)
    }

    fn pane_base_index(&self) -> Result<u32> {
        Ok(0)
    }

    fn display_popup(&self, popup: &Popup) -> Result<()> {
        self.record(format!("display-popup {}", popup.argv.join(" ")));
        Ok(())
    }

    fn display_menu(&self, menu: &Menu) -> Result<()> {
        self.record(format!("display-menu {} items", menu.items.len()));
        Ok(())
    }
}
