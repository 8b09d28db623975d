//! Key routing for the manage UI.
//!
//! [`Router`] owns focus, the overlay and the confirmation dialog. It turns
//! key events into [`Intent`]s and never performs I/O itself: the front-end
//! runs intents on worker tasks and feeds results back through the `set_*`
//! and `accept_*` methods.
//!
//! ```text
//!  SessionList <-> PreviewPane <-> ContextPane    Tab / Shift-Tab
//!  any         --Ctrl-N-->  Overlay(create)
//!  any         --Delete-->  Dialog --y--> Kill
//!  SessionList --R------->  Rename
//!  base        --?------->  Help
//!  SessionList --w------->  WindowManager --Esc--> SessionList
//! ```
//!
//! Only one overlay is open at a time. A dialog may sit above an overlay.

use crate::completion::Completion;
use crate::coordinator::RepoTarget;
use crate::repos::Repository;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::path::PathBuf;

/// What currently receives keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    SessionList,
    PreviewPane,
    ContextPane,
    WindowManager,
    Overlay,
    Rename,
    Dialog,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Base {
    SessionList,
    PreviewPane,
    ContextPane,
    WindowManager,
}

impl Base {
    fn next(self) -> Self {
        match self {
            Base::SessionList => Base::PreviewPane,
            Base::PreviewPane => Base::ContextPane,
            Base::ContextPane | Base::WindowManager => Base::SessionList,
        }
    }

    fn prev(self) -> Self {
        match self {
            Base::SessionList => Base::ContextPane,
            Base::PreviewPane => Base::SessionList,
            Base::ContextPane => Base::PreviewPane,
            Base::WindowManager => Base::SessionList,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameTarget {
    Session(String),
    Window { session: String, index: u32 },
}

/// Work for the front-end to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Quit,
    /// The selected session changed; refresh its preview and contexts.
    Select { session: String },
    /// Preview a different window of the selected session.
    Preview { session: String, window: u32 },
    Attach { session: String },
    Kill { session: String },
    KillWindow { session: String, index: u32 },
    Rename { target: RenameTarget, new_name: String },
    Create { target: RepoTarget },
    /// Ask the completion engine about `partial`; tag the answer with `generation`.
    Complete { generation: u64, partial: String },
    SetContext { session: String, context: String },
    DeleteContext { session: String, context: String },
    MoveContext { context: String, from: String, to: String },
    CycleSort,
    Reload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateField {
    Filter,
    Command,
}

#[derive(Debug, Clone)]
pub struct CreateOverlay {
    pub field: CreateField,
    pub filter: String,
    pub repos: Vec<Repository>,
    pub selected: usize,
    pub command: String,
    pub completions: Vec<Completion>,
    pub completion_selected: usize,
}

impl CreateOverlay {
    fn new() -> Self {
        CreateOverlay {
            field: CreateField::Filter,
            filter: String::new(),
            repos: Vec::new(),
            selected: 0,
            command: String::new(),
            completions: Vec::new(),
            completion_selected: 0,
        }
    }

    /// Repositories whose label contains the filter, ignoring case.
    pub fn matches(&self) -> Vec<&Repository> {
        let needle = self.filter.to_lowercase();
        self.repos
            .iter()
            .filter(|r| r.label().to_lowercase().contains(&needle))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum Overlay {
    Create(CreateOverlay),
    Rename { target: RenameTarget, input: String },
    MoveContext { context: String, from: String, input: String },
    Help,
}

/// A yes/no question; `on_confirm` runs when the answer is yes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub prompt: String,
    pub on_confirm: Intent,
}

#[derive(Debug, Clone, Default)]
struct Selection<T> {
    items: Vec<T>,
    index: usize,
}

impl<T: PartialEq> Selection<T> {
    /// Replace the items, keeping the current item selected when it survives.
    fn set(&mut self, items: Vec<T>) {
        let current = self.items.get(self.index);
        self.index = current
            .and_then(|c| items.iter().position(|i| i == c))
            .unwrap_or(self.index.min(items.len().saturating_sub(1)));
        self.items = items;
    }

    fn current(&self) -> Option<&T> {
        self.items.get(self.index)
    }

    fn step(&mut self, down: bool) -> bool {
        let before = self.index;
        self.index = step(self.index, self.items.len(), down);
        before != self.index
    }
}

fn step(index: usize, len: usize, down: bool) -> usize {
    if down {
        (index + 1).min(len.saturating_sub(1))
    } else {
        index.saturating_sub(1)
    }
}

/// Append printable characters and handle backspace. Returns true if `buf` changed.
fn edit(buf: &mut String, key: &KeyEvent) -> bool {
    match key.code {
        KeyCode::Char(c) if !key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) => {
            buf.push(c);
            true
        }
        KeyCode::Backspace => buf.pop().is_some(),
        _ => false,
    }
}

pub struct Router {
    base: Base,
    overlay: Option<Overlay>,
    dialog: Option<Dialog>,
    generation: u64,
    sessions: Selection<String>,
    windows: Selection<(u32, String)>,
    contexts: Selection<String>,
    /// Directory for sessions created from a bare name.
    cwd: PathBuf,
}

impl Router {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Router {
            base: Base::SessionList,
            overlay: None,
            dialog: None,
            generation: 0,
            sessions: Selection::default(),
            windows: Selection::default(),
            contexts: Selection::default(),
            cwd: cwd.into(),
        }
    }

    pub fn focus(&self) -> Focus {
        if self.dialog.is_some() {
            return Focus::Dialog;
        }
        match (&self.overlay, self.base) {
            (Some(Overlay::Rename { .. }), _) => Focus::Rename,
            (Some(Overlay::Help), _) => Focus::Help,
            (Some(_), _) => Focus::Overlay,
            (None, Base::SessionList) => Focus::SessionList,
            (None, Base::PreviewPane) => Focus::PreviewPane,
            (None, Base::ContextPane) => Focus::ContextPane,
            (None, Base::WindowManager) => Focus::WindowManager,
        }
    }

    /// Focus underneath any overlay.
    pub fn base_focus(&self) -> Focus {
        match self.base {
            Base::SessionList => Focus::SessionList,
            Base::PreviewPane => Focus::PreviewPane,
            Base::ContextPane => Focus::ContextPane,
            Base::WindowManager => Focus::WindowManager,
        }
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    pub fn dialog(&self) -> Option<&Dialog> {
        self.dialog.as_ref()
    }

    /// Bumped whenever an overlay opens or closes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn selected_session(&self) -> Option<&str> {
        self.sessions.current().map(String::as_str)
    }

    pub fn session_index(&self) -> usize {
        self.sessions.index
    }

    pub fn selected_window(&self) -> Option<u32> {
        self.windows.current().map(|(i, _)| *i)
    }

    pub fn window_index(&self) -> usize {
        self.windows.index
    }

    pub fn selected_context(&self) -> Option<&str> {
        self.contexts.current().map(String::as_str)
    }

    pub fn context_index(&self) -> usize {
        self.contexts.index
    }

    /// Session names in display order.
    pub fn set_sessions(&mut self, names: Vec<String>) {
        self.sessions.set(names);
    }

    /// `(index, name)` of the selected session's windows.
    pub fn set_windows(&mut self, windows: Vec<(u32, String)>) {
        self.windows.set(windows);
    }

    /// Short names of the selected session's contexts.
    pub fn set_contexts(&mut self, contexts: Vec<String>) {
        self.contexts.set(contexts);
    }

    /// Add a discovered repository to the create overlay. Returns false if
    /// the overlay it was meant for is gone.
    pub fn accept_repository(&mut self, generation: u64, repo: Repository) -> bool {
        match &mut self.overlay {
            Some(Overlay::Create(create)) if generation == self.generation => {
                create.repos.push(repo);
                true
            }
            _ => false,
        }
    }

    /// Store completions for the command field. Results for a dismissed
    /// overlay or for an outdated command are dropped.
    pub fn accept_completions(
        &mut self,
        generation: u64,
        partial: &str,
        completions: Vec<Completion>,
    ) -> bool {
        match &mut self.overlay {
            Some(Overlay::Create(create))
                if generation == self.generation && create.command == partial =>
            {
                create.completions = completions;
                create.completion_selected = 0;
                true
            }
            _ => false,
        }
    }

    /// Open the create overlay unless another overlay is in the way.
    pub fn open_create(&mut self) {
        if matches!(self.overlay, None | Some(Overlay::Help)) {
            self.open(Overlay::Create(CreateOverlay::new()));
        }
    }

    fn open(&mut self, overlay: Overlay) {
        self.generation += 1;
        self.overlay = Some(overlay);
    }

    fn close(&mut self) {
        self.generation += 1;
        self.overlay = None;
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Intent> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && key.code == KeyCode::Char('c') {
            return Some(Intent::Quit);
        }
        if self.dialog.is_some() {
            return self.dialog_key(key);
        }
        if ctrl && key.code == KeyCode::Char('n') {
            self.open_create();
            return None;
        }
        if key.code == KeyCode::Delete {
            self.dialog = self.kill_dialog();
            return None;
        }
        if self.overlay.is_some() {
            return self.overlay_key(key);
        }
        self.base_key(key)
    }

    fn kill_dialog(&self) -> Option<Dialog> {
        let session = self.selected_session()?.to_string();
        if self.overlay.is_none() && self.base == Base::WindowManager {
            let (index, name) = self.windows.current()?.clone();
            return Some(Dialog {
                prompt: format!("Kill window {index}: {name}?"),
                on_confirm: Intent::KillWindow { session, index },
            });
        }
        Some(Dialog {
            prompt: format!("Kill session {session}?"),
            on_confirm: Intent::Kill { session },
        })
    }

    fn dialog_key(&mut self, key: KeyEvent) -> Option<Intent> {
        match key.code {
            KeyCode::Char('y' | 'Y') | KeyCode::Enter => {
                self.dialog.take().map(|d| d.on_confirm)
            }
            KeyCode::Char('n' | 'N' | 'q') | KeyCode::Esc => {
                self.dialog = None;
                None
            }
            _ => None,
        }
    }

    fn base_key(&mut self, key: KeyEvent) -> Option<Intent> {
        match key.code {
            KeyCode::Esc if self.base == Base::WindowManager => {
                self.base = Base::SessionList;
                None
            }
            KeyCode::Esc | KeyCode::Char('q') => Some(Intent::Quit),
            KeyCode::Tab => {
                self.base = self.base.next();
                None
            }
            KeyCode::BackTab => {
                self.base = self.base.prev();
                None
            }
            KeyCode::Char('?') => {
                self.open(Overlay::Help);
                None
            }
            _ => match self.base {
                Base::SessionList => self.session_key(key),
                Base::PreviewPane => self.preview_key(key),
                Base::ContextPane => self.context_key(key),
                Base::WindowManager => self.window_key(key),
            },
        }
    }

    fn session_key(&mut self, key: KeyEvent) -> Option<Intent> {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') | KeyCode::Down | KeyCode::Char('j') => {
                let down = matches!(key.code, KeyCode::Down | KeyCode::Char('j'));
                self.sessions.step(down).then(|| self.select_intent()).flatten()
            }
            KeyCode::Enter => Some(Intent::Attach {
                session: self.selected_session()?.to_string(),
            }),
            KeyCode::Char('R') => {
                let session = self.selected_session()?.to_string();
                self.open(Overlay::Rename {
                    input: session.clone(),
                    target: RenameTarget::Session(session),
                });
                None
            }
            KeyCode::Char('w') => {
                self.selected_session()?;
                self.base = Base::WindowManager;
                None
            }
            KeyCode::Char('s') => Some(Intent::CycleSort),
            KeyCode::Char('r') => Some(Intent::Reload),
            _ => None,
        }
    }

    fn select_intent(&self) -> Option<Intent> {
        Some(Intent::Select {
            session: self.selected_session()?.to_string(),
        })
    }

    fn preview_key(&mut self, key: KeyEvent) -> Option<Intent> {
        let down = match key.code {
            KeyCode::Down | KeyCode::Char('j') => true,
            KeyCode::Up | KeyCode::Char('k') => false,
            _ => return None,
        };
        if !self.windows.step(down) {
            return None;
        }
        Some(Intent::Preview {
            session: self.selected_session()?.to_string(),
            window: self.selected_window()?,
        })
    }

    fn window_key(&mut self, key: KeyEvent) -> Option<Intent> {
        match key.code {
            KeyCode::Down | KeyCode::Char('j') | KeyCode::Up | KeyCode::Char('k') => {
                self.preview_key(key)
            }
            KeyCode::Enter => Some(Intent::Attach {
                session: self.selected_session()?.to_string(),
            }),
            KeyCode::Char('R') => {
                let session = self.selected_session()?.to_string();
                let (index, name) = self.windows.current()?.clone();
                self.open(Overlay::Rename {
                    target: RenameTarget::Window { session, index },
                    input: name,
                });
                None
            }
            _ => None,
        }
    }

    fn context_key(&mut self, key: KeyEvent) -> Option<Intent> {
        match key.code {
            KeyCode::Down | KeyCode::Char('j') => {
                self.contexts.step(true);
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.contexts.step(false);
                None
            }
            KeyCode::Enter => Some(Intent::SetContext {
                session: self.selected_session()?.to_string(),
                context: self.selected_context()?.to_string(),
            }),
            KeyCode::Char('m') => {
                let from = self.selected_session()?.to_string();
                let context = self.selected_context()?.to_string();
                self.open(Overlay::MoveContext {
                    context,
                    from,
                    input: String::new(),
                });
                None
            }
            KeyCode::Char('d') => {
                let session = self.selected_session()?.to_string();
                let context = self.selected_context()?.to_string();
                self.dialog = Some(Dialog {
                    prompt: format!("Delete context {context} from {session}?"),
                    on_confirm: Intent::DeleteContext { session, context },
                });
                None
            }
            _ => None,
        }
    }

    fn overlay_key(&mut self, key: KeyEvent) -> Option<Intent> {
        if key.code == KeyCode::Esc {
            self.close();
            return None;
        }
        let generation = self.generation;
        let cwd = self.cwd.clone();
        let overlay = self.overlay.as_mut()?;
        let (intent, done) = match overlay {
            Overlay::Help => (None, matches!(key.code, KeyCode::Char('?' | 'q') | KeyCode::Enter)),
            Overlay::Rename { target, input } => match key.code {
                KeyCode::Enter if !input.trim().is_empty() => (
                    Some(Intent::Rename {
                        target: target.clone(),
                        new_name: input.trim().to_string(),
                    }),
                    true,
                ),
                _ => {
                    edit(input, &key);
                    (None, false)
                }
            },
            Overlay::MoveContext {
                context,
                from,
                input,
            } => match key.code {
                KeyCode::Enter if !input.trim().is_empty() => (
                    Some(Intent::MoveContext {
                        context: context.clone(),
                        from: from.clone(),
                        to: input.trim().to_string(),
                    }),
                    true,
                ),
                _ => {
                    edit(input, &key);
                    (None, false)
                }
            },
            Overlay::Create(create) => create_key(create, key, generation, &cwd),
        };
        if done {
            self.close();
        }
        intent
    }
}

fn create_key(
    create: &mut CreateOverlay,
    key: KeyEvent,
    generation: u64,
    cwd: &std::path::Path,
) -> (Option<Intent>, bool) {
    match key.code {
        KeyCode::Tab | KeyCode::BackTab => {
            create.field = match create.field {
                CreateField::Filter => CreateField::Command,
                CreateField::Command => CreateField::Filter,
            };
            (None, false)
        }
        KeyCode::Up | KeyCode::Down => {
            let down = key.code == KeyCode::Down;
            match create.field {
                CreateField::Filter => {
                    create.selected = step(create.selected, create.matches().len(), down);
                }
                CreateField::Command => {
                    create.completion_selected =
                        step(create.completion_selected, create.completions.len(), down);
                }
            }
            (None, false)
        }
        KeyCode::Right if create.field == CreateField::Command => {
            if let Some(c) = create.completions.get(create.completion_selected) {
                create.command = c.replacement.clone();
                create.completions.clear();
                create.completion_selected = 0;
            }
            (None, false)
        }
        KeyCode::Enter => {
            let command = Some(create.command.trim().to_string()).filter(|c| !c.is_empty());
            let target = match create.matches().get(create.selected) {
                Some(repo) => RepoTarget {
                    command,
                    ..repo.target()
                },
                None if !create.filter.trim().is_empty() => RepoTarget {
                    name: create.filter.trim().to_string(),
                    owner: None,
                    path: cwd.to_path_buf(),
                    command,
                },
                None => return (None, false),
            };
            (Some(Intent::Create { target }), true)
        }
        _ => match create.field {
            CreateField::Filter => {
                if edit(&mut create.filter, &key) {
                    create.selected = 0;
                }
                (None, false)
            }
            CreateField::Command => {
                if !edit(&mut create.command, &key) {
                    return (None, false);
                }
                create.completions.clear();
                let intent = Intent::Complete {
                    generation,
                    partial: create.command.clone(),
                };
                (Some(intent), false)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_str(router: &mut Router, s: &str) -> Vec<Intent> {
        s.chars()
            .filter_map(|c| router.handle_key(key(KeyCode::Char(c))))
            .collect()
    }

    fn router() -> Router {
        let mut r = Router::new("/work");
        r.set_sessions(vec!["api".into(), "web".into()]);
        r.set_windows(vec![(0, "editor".into()), (1, "logs".into())]);
        r.set_contexts(vec!["dev".into(), "prod".into()]);
        r
    }

    fn repo(name: &str, owner: Option<&str>) -> Repository {
        Repository {
            name: name.into(),
            owner: owner.map(str::to_string),
            path: PathBuf::from(format!("/src/{name}")),
            url: String::new(),
        }
    }

    #[test]
    fn test_tab_cycles_base_panes() {
        let mut r = router();
        assert_eq!(r.focus(), Focus::SessionList);
        r.handle_key(key(KeyCode::Tab));
        assert_eq!(r.focus(), Focus::PreviewPane);
        r.handle_key(key(KeyCode::Tab));
        assert_eq!(r.focus(), Focus::ContextPane);
        r.handle_key(key(KeyCode::Tab));
        assert_eq!(r.focus(), Focus::SessionList);
        r.handle_key(key(KeyCode::BackTab));
        assert_eq!(r.focus(), Focus::ContextPane);
    }

    #[test]
    fn test_esc_on_base_quits() {
        let mut r = router();
        assert_eq!(r.handle_key(key(KeyCode::Esc)), Some(Intent::Quit));
        assert_eq!(r.handle_key(ctrl('c')), Some(Intent::Quit));
    }

    #[test]
    fn test_session_navigation_and_attach() {
        let mut r = router();
        assert_eq!(r.handle_key(key(KeyCode::Up)), None);
        assert_eq!(
            r.handle_key(key(KeyCode::Char('j'))),
            Some(Intent::Select { session: "web".into() })
        );
        assert_eq!(r.handle_key(key(KeyCode::Down)), None, "already at the end");
        assert_eq!(
            r.handle_key(key(KeyCode::Enter)),
            Some(Intent::Attach { session: "web".into() })
        );
    }

    #[test]
    fn test_selection_follows_name_across_updates() {
        let mut r = router();
        r.handle_key(key(KeyCode::Down));
        r.set_sessions(vec!["aaa".into(), "api".into(), "web".into()]);
        assert_eq!(r.selected_session(), Some("web"));
        r.set_sessions(vec!["aaa".into()]);
        assert_eq!(r.selected_session(), Some("aaa"));
        r.set_sessions(Vec::new());
        assert_eq!(r.selected_session(), None);
        assert_eq!(r.handle_key(key(KeyCode::Enter)), None);
    }

    #[test]
    fn test_delete_confirms_before_kill() {
        let mut r = router();
        assert_eq!(r.handle_key(key(KeyCode::Delete)), None);
        assert_eq!(r.focus(), Focus::Dialog);
        assert_eq!(r.dialog().unwrap().prompt, "Kill session api?");
        assert_eq!(r.handle_key(key(KeyCode::Char('x'))), None);
        assert_eq!(
            r.handle_key(key(KeyCode::Char('y'))),
            Some(Intent::Kill { session: "api".into() })
        );
        assert_eq!(r.focus(), Focus::SessionList);

        r.handle_key(key(KeyCode::Delete));
        assert_eq!(r.handle_key(key(KeyCode::Esc)), None);
        assert_eq!(r.focus(), Focus::SessionList);
    }

    #[test]
    fn test_dialog_above_overlay_keeps_overlay() {
        let mut r = router();
        r.handle_key(ctrl('n'));
        r.handle_key(key(KeyCode::Delete));
        assert_eq!(r.focus(), Focus::Dialog);
        r.handle_key(key(KeyCode::Char('n')));
        assert_eq!(r.focus(), Focus::Overlay);
    }

    #[test]
    fn test_rename_session() {
        let mut r = router();
        r.handle_key(key(KeyCode::Char('R')));
        assert_eq!(r.focus(), Focus::Rename);
        for _ in 0.."api".len() {
            r.handle_key(key(KeyCode::Backspace));
        }
        assert_eq!(r.handle_key(key(KeyCode::Enter)), None, "empty name ignored");
        type_str(&mut r, "backend");
        assert_eq!(
            r.handle_key(key(KeyCode::Enter)),
            Some(Intent::Rename {
                target: RenameTarget::Session("api".into()),
                new_name: "backend".into(),
            })
        );
        assert_eq!(r.focus(), Focus::SessionList);
    }

    #[test]
    fn test_overlay_esc_returns_to_previous_focus() {
        let mut r = router();
        r.handle_key(key(KeyCode::Tab));
        r.handle_key(key(KeyCode::Char('?')));
        assert_eq!(r.focus(), Focus::Help);
        assert_eq!(r.handle_key(key(KeyCode::Esc)), None);
        assert_eq!(r.focus(), Focus::PreviewPane);
    }

    #[test]
    fn test_single_overlay_at_a_time() {
        let mut r = router();
        r.handle_key(key(KeyCode::Char('R')));
        r.handle_key(ctrl('n'));
        assert_eq!(r.focus(), Focus::Rename);

        let mut r = router();
        r.handle_key(key(KeyCode::Char('?')));
        r.handle_key(ctrl('n'));
        assert_eq!(r.focus(), Focus::Overlay);
        assert!(matches!(r.overlay(), Some(Overlay::Create(_))));
    }

    #[test]
    fn test_window_manager() {
        let mut r = router();
        r.handle_key(key(KeyCode::Char('w')));
        assert_eq!(r.focus(), Focus::WindowManager);
        assert_eq!(
            r.handle_key(key(KeyCode::Down)),
            Some(Intent::Preview { session: "api".into(), window: 1 })
        );
        r.handle_key(key(KeyCode::Delete));
        assert_eq!(
            r.handle_key(key(KeyCode::Enter)),
            Some(Intent::KillWindow { session: "api".into(), index: 1 })
        );
        r.handle_key(key(KeyCode::Char('R')));
        type_str(&mut r, "2");
        assert_eq!(
            r.handle_key(key(KeyCode::Enter)),
            Some(Intent::Rename {
                target: RenameTarget::Window { session: "api".into(), index: 1 },
                new_name: "logs2".into(),
            })
        );
        assert_eq!(r.handle_key(key(KeyCode::Esc)), None);
        assert_eq!(r.focus(), Focus::SessionList);
    }

    #[test]
    fn test_context_pane_actions() {
        let mut r = router();
        r.handle_key(key(KeyCode::BackTab));
        assert_eq!(r.focus(), Focus::ContextPane);
        r.handle_key(key(KeyCode::Down));
        assert_eq!(
            r.handle_key(key(KeyCode::Enter)),
            Some(Intent::SetContext { session: "api".into(), context: "prod".into() })
        );

        r.handle_key(key(KeyCode::Char('m')));
        assert_eq!(r.focus(), Focus::Overlay);
        type_str(&mut r, "web");
        assert_eq!(
            r.handle_key(key(KeyCode::Enter)),
            Some(Intent::MoveContext {
                context: "prod".into(),
                from: "api".into(),
                to: "web".into(),
            })
        );

        r.handle_key(key(KeyCode::Char('d')));
        assert_eq!(
            r.handle_key(key(KeyCode::Enter)),
            Some(Intent::DeleteContext { session: "api".into(), context: "prod".into() })
        );
    }

    #[test]
    fn test_create_filters_repositories() {
        let mut r = router();
        r.handle_key(ctrl('n'));
        let generation = r.generation();
        assert!(r.accept_repository(generation, repo("core", Some("alice"))));
        assert!(r.accept_repository(generation, repo("web", None)));

        type_str(&mut r, "ALICE");
        let Some(Intent::Create { target }) = r.handle_key(key(KeyCode::Enter)) else {
            panic!("expected create");
        };
        assert_eq!(target.name, "core");
        assert_eq!(target.owner.as_deref(), Some("alice"));
        assert_eq!(target.path, PathBuf::from("/src/core"));
        assert_eq!(r.focus(), Focus::SessionList);
        assert!(!r.accept_repository(generation, repo("late", None)));
    }

    #[test]
    fn test_create_from_bare_name() {
        let mut r = router();
        r.handle_key(ctrl('n'));
        assert_eq!(r.handle_key(key(KeyCode::Enter)), None);
        type_str(&mut r, "scratch");
        assert_eq!(
            r.handle_key(key(KeyCode::Enter)),
            Some(Intent::Create {
                target: RepoTarget {
                    name: "scratch".into(),
                    owner: None,
                    path: PathBuf::from("/work"),
                    command: None,
                }
            })
        );
    }

    #[test]
    fn test_command_field_requests_and_accepts_completions() {
        let mut r = router();
        r.handle_key(ctrl('n'));
        r.accept_repository(r.generation(), repo("core", None));
        r.handle_key(key(KeyCode::Tab));
        let generation = r.generation();

        let intents = type_str(&mut r, "git ch");
        assert_eq!(intents.len(), 6);
        assert_eq!(
            intents.last(),
            Some(&Intent::Complete { generation, partial: "git ch".into() })
        );

        let completions = vec![
            Completion {
                option: "checkout".into(),
                description: String::new(),
                replacement: "git checkout".into(),
            },
            Completion {
                option: "cherry-pick".into(),
                description: String::new(),
                replacement: "git cherry-pick".into(),
            },
        ];
        assert!(!r.accept_completions(generation, "git c", completions.clone()));
        assert!(r.accept_completions(generation, "git ch", completions.clone()));
        r.handle_key(key(KeyCode::Down));
        r.handle_key(key(KeyCode::Right));

        let Some(Intent::Create { target }) = r.handle_key(key(KeyCode::Enter)) else {
            panic!("expected create");
        };
        assert_eq!(target.command.as_deref(), Some("git cherry-pick"));
        assert!(!r.accept_completions(generation, "git ch", completions));
    }

    #[test]
    fn test_release_events_ignored() {
        let mut r = router();
        let mut release = key(KeyCode::Esc);
        release.kind = KeyEventKind::Release;
        assert_eq!(r.handle_key(release), None);
    }
}
