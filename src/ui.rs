//! Full-screen front-end for `manage` and the `create` picker.
//!
//! Input is read on a blocking task and forwarded over a channel; coordinator
//! calls run on spawned tasks and post their results to the same channel, so
//! the draw loop never waits on tmux or the filesystem.

use crate::ansi;
use crate::completion::{Completer, Completion};
use crate::config::{RepositorySettings, Settings};
use crate::coordinator::{Coordinator, Dialog};
use crate::error::{MuxctxError, Result};
use crate::kube::ContextEntry;
use crate::repos::{self, Repository};
use crate::router::{CreateField, Focus, Intent, Overlay, RenameTarget, Router};
use crate::session::{CatalogEvent, Session, window_label};
use crossterm::event::{self, Event, KeyEvent};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const MIN_WIDTH: u16 = 60;
pub const MIN_HEIGHT: u16 = 15;

const TOAST_TTL: Duration = Duration::from_secs(4);
/// Border, message, progress bar, border.
const TOAST_HEIGHT: u16 = 4;
const TOAST_WIDTH: u16 = 40;
const MAX_TOASTS: usize = 3;
const INPUT_POLL: Duration = Duration::from_millis(100);
const TICK: Duration = Duration::from_millis(250);

const HELP: &str = "\
Tab / Shift-Tab   switch pane
Up/Down, j/k      move
Enter             attach session / use context
Ctrl-N            new session
Delete            kill session (window in window list)
R                 rename session or window
w                 window list
m                 move context to another session
d                 delete context
s                 cycle sort order
r                 reload
?                 this help
Esc, q            close / quit";

/// Fail early when the terminal cannot fit the UI.
pub fn check_size(width: u16, height: u16) -> Result<()> {
    if width < MIN_WIDTH || height < MIN_HEIGHT {
        return Err(MuxctxError::TerminalTooSmall {
            min_width: MIN_WIDTH,
            min_height: MIN_HEIGHT,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl ToastLevel {
    fn color(self) -> Color {
        match self {
            ToastLevel::Info => Color::Blue,
            ToastLevel::Success => Color::Green,
            ToastLevel::Warning => Color::Yellow,
            ToastLevel::Error => Color::Red,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
    created: Instant,
}

impl Toast {
    pub fn new(level: ToastLevel, message: impl Into<String>, now: Instant) -> Self {
        Toast {
            level,
            message: message.into(),
            created: now,
        }
    }

    /// Share of the lifetime left, from 1.0 down to 0.0.
    pub fn remaining(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.created);
        1.0 - (elapsed.as_secs_f64() / TOAST_TTL.as_secs_f64()).min(1.0)
    }

    pub fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created) >= TOAST_TTL
    }
}

/// Newest last; the oldest is dropped beyond [`MAX_TOASTS`].
#[derive(Debug, Default)]
pub struct Toasts {
    items: VecDeque<Toast>,
}

impl Toasts {
    pub fn push(&mut self, toast: Toast) {
        if self.items.len() == MAX_TOASTS {
            self.items.pop_front();
        }
        self.items.push_back(toast);
    }

    pub fn prune(&mut self, now: Instant) {
        self.items.retain(|t| !t.expired(now));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Toast> {
        self.items.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A `width x height` rectangle centred in `area`, clamped to it.
pub fn centered(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn progress_bar(ratio: f64, width: u16) -> String {
    let filled = (ratio * f64::from(width)).round() as usize;
    let filled = filled.min(width as usize);
    format!("{}{}", "━".repeat(filled), " ".repeat(width as usize - filled))
}

/// What the screen shows, apart from router state.
#[derive(Debug)]
pub struct View {
    pub sessions: Vec<Session>,
    pub contexts: Vec<ContextEntry>,
    pub preview: String,
    pub toasts: Toasts,
    pub sort_label: &'static str,
    pub border: Color,
    pub manage_contexts: bool,
}

impl View {
    pub fn new(border: Color) -> Self {
        View {
            sessions: Vec::new(),
            contexts: Vec::new(),
            preview: String::new(),
            toasts: Toasts::default(),
            sort_label: "",
            border,
            manage_contexts: true,
        }
    }

    fn session(&self, name: Option<&str>) -> Option<&Session> {
        let name = name?;
        self.sessions.iter().find(|s| s.name == name)
    }

    fn block(&self, title: &str, focused: bool) -> Block<'static> {
        let style = if focused {
            Style::default().fg(self.border).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        Block::default()
            .borders(Borders::ALL)
            .border_style(style)
            .title(format!(" {title} "))
    }
}

pub fn draw(frame: &mut Frame, view: &View, router: &Router) {
    let area = frame.size();
    if check_size(area.width, area.height).is_err() {
        let text = format!("Terminal too small: need {MIN_WIDTH}x{MIN_HEIGHT}");
        frame.render_widget(Paragraph::new(text), area);
        return;
    }

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(area);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(rows[0]);
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(columns[1]);

    let base = router.base_focus();
    if base == Focus::WindowManager {
        draw_windows(frame, view, router, columns[0]);
    } else {
        draw_sessions(frame, view, router, columns[0], base == Focus::SessionList);
    }
    let preview = Paragraph::new(ansi::strip_escapes(&view.preview))
        .block(view.block("Preview", base == Focus::PreviewPane));
    frame.render_widget(preview, right[0]);
    draw_contexts(frame, view, router, right[1], base == Focus::ContextPane);

    let hints = format!(
        " ? help  Ctrl-N new  Enter attach  Del kill  R rename  w windows  sort: {}",
        view.sort_label
    );
    frame.render_widget(
        Paragraph::new(hints).style(Style::default().fg(Color::DarkGray)),
        rows[1],
    );

    if let Some(overlay) = router.overlay() {
        draw_overlay(frame, view, overlay, area);
    }
    if let Some(dialog) = router.dialog() {
        let rect = centered(dialog.prompt.len() as u16 + 6, 5, area);
        frame.render_widget(Clear, rect);
        let text = format!("{}\n\n[y]es  [n]o", dialog.prompt);
        frame.render_widget(
            Paragraph::new(text)
                .alignment(Alignment::Center)
                .block(view.block("Confirm", true)),
            rect,
        );
    }
    draw_toasts(frame, view, area);
}

fn draw_sessions(frame: &mut Frame, view: &View, router: &Router, area: Rect, focused: bool) {
    let items: Vec<ListItem> = view
        .sessions
        .iter()
        .map(|s| {
            let marker = if s.attached { "*" } else { " " };
            ListItem::new(format!("{marker} {} ({})", s.name, s.window_count))
        })
        .collect();
    let mut state = ListState::default();
    if !items.is_empty() {
        state.select(Some(router.session_index()));
    }
    let list = List::new(items)
        .block(view.block("Sessions", focused))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_windows(frame: &mut Frame, view: &View, router: &Router, area: Rect) {
    let session = view.session(router.selected_session());
    let items: Vec<ListItem> = session
        .map(|s| s.windows.iter().map(|w| ListItem::new(window_label(w))).collect())
        .unwrap_or_default();
    let mut state = ListState::default();
    if !items.is_empty() {
        state.select(Some(router.window_index()));
    }
    let title = format!("Windows of {}", router.selected_session().unwrap_or("-"));
    let list = List::new(items)
        .block(view.block(&title, true))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_contexts(frame: &mut Frame, view: &View, router: &Router, area: Rect, focused: bool) {
    let block = view.block("Contexts", focused);
    if !view.manage_contexts {
        frame.render_widget(Paragraph::new("context management disabled").block(block), area);
        return;
    }
    let items: Vec<ListItem> = view
        .contexts
        .iter()
        .map(|c| {
            let marker = if c.is_current { "*" } else { " " };
            ListItem::new(format!("{marker} {}  {}  {}", c.short_name, c.namespace, c.host_url))
        })
        .collect();
    let mut state = ListState::default();
    if !items.is_empty() {
        state.select(Some(router.context_index()));
    }
    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_overlay(frame: &mut Frame, view: &View, overlay: &Overlay, area: Rect) {
    match overlay {
        Overlay::Help => {
            let height = HELP.lines().count() as u16 + 2;
            let rect = centered(56, height, area);
            frame.render_widget(Clear, rect);
            frame.render_widget(Paragraph::new(HELP).block(view.block("Help", true)), rect);
        }
        Overlay::Rename { target, input } => {
            let title = match target {
                RenameTarget::Session(name) => format!("Rename session {name}"),
                RenameTarget::Window { session, index } => format!("Rename window {session}:{index}"),
            };
            let rect = centered(50, 3, area);
            frame.render_widget(Clear, rect);
            frame.render_widget(Paragraph::new(format!("{input}_")).block(view.block(&title, true)), rect);
        }
        Overlay::MoveContext { context, from, input } => {
            let title = format!("Move {context} from {from} to");
            let rect = centered(50, 3, area);
            frame.render_widget(Clear, rect);
            frame.render_widget(Paragraph::new(format!("{input}_")).block(view.block(&title, true)), rect);
        }
        Overlay::Create(create) => {
            let rect = centered(area.width * 4 / 5, area.height * 4 / 5, area);
            frame.render_widget(Clear, rect);
            let outer = view.block("New session", true);
            let inner = outer.inner(rect);
            frame.render_widget(outer, rect);
            let parts = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(1),
                    Constraint::Min(1),
                    Constraint::Length(1),
                    Constraint::Length(6),
                ])
                .split(inner);

            let cursor = |field: CreateField| if create.field == field { "_" } else { "" };
            frame.render_widget(
                Paragraph::new(format!("filter: {}{}", create.filter, cursor(CreateField::Filter))),
                parts[0],
            );
            let matches = create.matches();
            let items: Vec<ListItem> = matches.iter().map(|r| ListItem::new(r.label())).collect();
            let mut state = ListState::default();
            if !items.is_empty() {
                state.select(Some(create.selected));
            }
            frame.render_stateful_widget(
                List::new(items).highlight_style(Style::default().add_modifier(Modifier::REVERSED)),
                parts[1],
                &mut state,
            );
            frame.render_widget(
                Paragraph::new(format!("command: {}{}", create.command, cursor(CreateField::Command))),
                parts[2],
            );
            let completions: Vec<ListItem> = create
                .completions
                .iter()
                .map(|c| ListItem::new(completion_line(c)))
                .collect();
            let mut state = ListState::default();
            if !completions.is_empty() {
                state.select(Some(create.completion_selected));
            }
            frame.render_stateful_widget(
                List::new(completions)
                    .highlight_style(Style::default().add_modifier(Modifier::REVERSED)),
                parts[3],
                &mut state,
            );
        }
    }
}

fn completion_line(c: &Completion) -> String {
    if c.description.is_empty() {
        c.option.clone()
    } else {
        format!("{:<24} {}", c.option, c.description)
    }
}

fn draw_toasts(frame: &mut Frame, view: &View, area: Rect) {
    let now = Instant::now();
    let width = TOAST_WIDTH.min(area.width);
    for (i, toast) in view.toasts.iter().enumerate() {
        let y = area.y + i as u16 * TOAST_HEIGHT;
        if y + TOAST_HEIGHT > area.height {
            break;
        }
        let rect = Rect {
            x: area.x + area.width - width,
            y,
            width,
            height: TOAST_HEIGHT,
        };
        let style = Style::default().fg(toast.level.color());
        let block = Block::default().borders(Borders::ALL).border_style(style);
        let inner_width = rect.width.saturating_sub(2);
        let text = vec![
            Line::from(ansi::fit(&toast.message, inner_width as usize)),
            Line::styled(progress_bar(toast.remaining(now), inner_width), style),
        ];
        frame.render_widget(Clear, rect);
        frame.render_widget(Paragraph::new(text).block(block).wrap(Wrap { trim: true }), rect);
    }
}

/// Which screen to start on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Manage,
    /// Only the create overlay; closing it exits.
    Picker,
}

/// The router already asked.
struct Confirmed;

impl Dialog for Confirmed {
    fn confirm(&self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

enum UiEvent {
    Key(KeyEvent),
    Resize,
    Done(Work),
}

enum Work {
    /// An action finished; an empty message shows no toast.
    Done { message: String, quit: bool },
    Failed(MuxctxError),
    Contexts { session: String, entries: Vec<ContextEntry> },
    Preview { session: String, text: String },
    Completions { generation: u64, partial: String, items: Vec<Completion> },
    Repository { generation: u64, repo: Repository },
    /// A create from the picker failed; the overlay comes back.
    CreateFailed(MuxctxError),
}

struct App {
    coordinator: Arc<Coordinator>,
    completer: Option<Arc<Completer>>,
    repositories: RepositorySettings,
    mode: Mode,
    router: Router,
    view: View,
    events: mpsc::UnboundedSender<UiEvent>,
    completion: CancellationToken,
    discovery: CancellationToken,
    /// A create from the picker is running; the picker quits when it ends.
    creating: bool,
    quit: bool,
}

impl App {
    fn spawn<F>(&self, work: F)
    where
        F: Future<Output = Result<Work>> + Send + 'static,
    {
        let events = self.events.clone();
        tokio::spawn(async move {
            let done = work.await.unwrap_or_else(Work::Failed);
            let _ = events.send(UiEvent::Done(done));
        });
    }

    fn toast(&mut self, level: ToastLevel, message: impl Into<String>) {
        self.view.toasts.push(Toast::new(level, message, Instant::now()));
    }

    /// Pull the catalog into the view and follow the selection.
    fn refresh_sessions(&mut self) {
        let before = self.router.selected_session().map(str::to_string);
        let sessions = self.coordinator.sessions();
        self.view.sessions = sessions.items();
        self.view.sort_label = sessions.sort().label();
        self.router
            .set_sessions(self.view.sessions.iter().map(|s| s.name.clone()).collect());
        if self.router.selected_session().map(str::to_string) != before {
            self.select();
        } else {
            self.update_windows();
        }
    }

    fn update_windows(&mut self) {
        let windows = self
            .view
            .session(self.router.selected_session())
            .map(|s| s.windows.iter().map(|w| (w.index, w.name.clone())).collect())
            .unwrap_or_default();
        self.router.set_windows(windows);
    }

    fn select(&mut self) {
        self.update_windows();
        let Some(session) = self.router.selected_session().map(str::to_string) else {
            self.view.preview.clear();
            self.view.contexts.clear();
            return;
        };
        if let Some(window) = self.router.selected_window() {
            self.preview(session.clone(), window);
        }
        if self.view.manage_contexts {
            self.load_contexts(session);
        }
    }

    fn load_contexts(&self, session: String) {
        let coordinator = Arc::clone(&self.coordinator);
        self.spawn(async move {
            let entries = coordinator.list_contexts(&session).await?;
            Ok(Work::Contexts { session, entries })
        });
    }

    fn preview(&self, session: String, index: u32) {
        let Some(window) = self
            .view
            .session(Some(&session))
            .and_then(|s| s.window(index))
            .cloned()
        else {
            return;
        };
        let coordinator = Arc::clone(&self.coordinator);
        self.spawn(async move {
            let text = coordinator
                .sessions()
                .run(move |mux| window.preview(mux, None))
                .await?;
            Ok(Work::Preview { session, text })
        });
    }

    fn start_discovery(&mut self) {
        self.discovery.cancel();
        self.discovery = CancellationToken::new();
        let stop = self.discovery.clone();
        let generation = self.router.generation();
        let mut found = repos::discover(&self.repositories);
        let events = self.events.clone();
        tokio::spawn(async move {
            loop {
                let repo = tokio::select! {
                    _ = stop.cancelled() => break,
                    repo = found.recv() => repo,
                };
                let Some(repo) = repo else { break };
                if events.send(UiEvent::Done(Work::Repository { generation, repo })).is_err() {
                    break;
                }
            }
        });
    }

    fn complete(&mut self, generation: u64, partial: String) {
        self.completion.cancel();
        let Some(completer) = self.completer.clone() else {
            return;
        };
        self.completion = CancellationToken::new();
        let cancel = self.completion.clone();
        self.spawn(async move {
            let items = completer.complete(&partial, &cancel).await?;
            Ok(Work::Completions { generation, partial, items })
        });
    }

    fn on_key(&mut self, key: KeyEvent) {
        let generation = self.router.generation();
        let intent = self.router.handle_key(key);
        self.on_overlay_change(generation);
        if let Some(intent) = intent {
            self.dispatch(intent);
        }
        if self.mode == Mode::Picker
            && !self.creating
            && self.router.overlay().is_none()
            && self.router.dialog().is_none()
        {
            self.quit = true;
        }
    }

    /// Drop work tied to a closed overlay and start discovery for a new one.
    fn on_overlay_change(&mut self, generation: u64) {
        if self.router.generation() == generation {
            return;
        }
        self.completion.cancel();
        self.discovery.cancel();
        if matches!(self.router.overlay(), Some(Overlay::Create(_))) {
            self.start_discovery();
        }
    }

    fn dispatch(&mut self, intent: Intent) {
        debug!(target: "muxctx::ui", "{intent:?}");
        let coordinator = Arc::clone(&self.coordinator);
        match intent {
            Intent::Quit => self.quit = true,
            Intent::Select { .. } => self.select(),
            Intent::Preview { session, window } => self.preview(session, window),
            Intent::Attach { session } => self.spawn(async move {
                coordinator.attach(&session).await?;
                Ok(Work::Done { message: format!("attached {session}"), quit: true })
            }),
            Intent::Kill { session } => self.spawn(async move {
                coordinator.kill(&session, true, &Confirmed).await?;
                Ok(Work::Done { message: format!("killed {session}"), quit: false })
            }),
            Intent::KillWindow { session, index } => self.spawn(async move {
                coordinator.kill_window(&session, index).await?;
                Ok(Work::Done { message: format!("killed {session}:{index}"), quit: false })
            }),
            Intent::Rename { target, new_name } => {
                let Some(session) = self.view.session(Some(match &target {
                    RenameTarget::Session(name) => name.as_str(),
                    RenameTarget::Window { session, .. } => session.as_str(),
                }))
                .cloned() else {
                    return;
                };
                self.spawn(async move {
                    match target {
                        RenameTarget::Session(_) => coordinator.rename(&session, &new_name).await?,
                        RenameTarget::Window { index, .. } => {
                            let window = session
                                .window(index)
                                .cloned()
                                .ok_or_else(|| MuxctxError::NotFound(format!("window {index}")))?;
                            coordinator.rename(&window, &new_name).await?
                        }
                    }
                    Ok(Work::Done { message: format!("renamed to {new_name}"), quit: false })
                })
            }
            Intent::Create { target } => {
                let picker = self.mode == Mode::Picker;
                self.creating = picker;
                self.spawn(async move {
                    match coordinator.create_or_attach(&target).await {
                        Ok(name) => Ok(Work::Done { message: format!("opened {name}"), quit: picker }),
                        Err(e) if picker => Ok(Work::CreateFailed(e)),
                        Err(e) => Err(e),
                    }
                })
            }
            Intent::Complete { generation, partial } => self.complete(generation, partial),
            Intent::SetContext { session, context } => self.spawn(async move {
                coordinator.set_context(&session, &context).await?;
                let entries = coordinator.list_contexts(&session).await?;
                Ok(Work::Contexts { session, entries })
            }),
            Intent::DeleteContext { session, context } => self.spawn(async move {
                coordinator.delete_context(&session, &context).await?;
                let entries = coordinator.list_contexts(&session).await?;
                Ok(Work::Contexts { session, entries })
            }),
            Intent::MoveContext { context, from, to } => self.spawn(async move {
                coordinator.move_context(&context, &from, &to).await?;
                Ok(Work::Done { message: format!("moved {context} to {to}"), quit: false })
            }),
            Intent::CycleSort => {
                let sessions = self.coordinator.sessions();
                sessions.set_sort(sessions.sort().next());
                self.refresh_sessions();
            }
            Intent::Reload => self.spawn(async move {
                coordinator.sessions().reload().await?;
                Ok(Work::Done { message: "reloaded".into(), quit: false })
            }),
        }
    }

    fn on_done(&mut self, work: Work) {
        match work {
            Work::Done { message, quit } => {
                if quit {
                    self.quit = true;
                } else {
                    if !message.is_empty() {
                        self.toast(ToastLevel::Success, message);
                    }
                    self.refresh_sessions();
                    if let Some(session) = self.router.selected_session().map(str::to_string) {
                        self.load_contexts(session);
                    }
                }
            }
            Work::CreateFailed(e) => {
                self.creating = false;
                if !e.is_silent() {
                    self.toast(ToastLevel::Error, e.to_string());
                }
                let generation = self.router.generation();
                self.router.open_create();
                self.on_overlay_change(generation);
            }
            Work::Failed(e) if e.is_silent() => debug!(target: "muxctx::ui", "{e}"),
            Work::Failed(e) => {
                let level = match e {
                    MuxctxError::Timeout(_) | MuxctxError::Conflict(_) => ToastLevel::Warning,
                    _ => ToastLevel::Error,
                };
                self.toast(level, e.to_string());
            }
            Work::Contexts { session, entries } => {
                if self.router.selected_session() == Some(session.as_str()) {
                    self.router
                        .set_contexts(entries.iter().map(|c| c.short_name.clone()).collect());
                    self.view.contexts = entries;
                }
            }
            Work::Preview { session, text } => {
                if self.router.selected_session() == Some(session.as_str()) {
                    self.view.preview = text;
                }
            }
            Work::Completions { generation, partial, items } => {
                self.router.accept_completions(generation, &partial, items);
            }
            Work::Repository { generation, repo } => {
                self.router.accept_repository(generation, repo);
            }
        }
    }

    fn on_catalog(&mut self, event: std::result::Result<CatalogEvent, broadcast::error::RecvError>) {
        match event {
            Ok(CatalogEvent::Ready) | Err(broadcast::error::RecvError::Lagged(_)) => {
                self.refresh_sessions()
            }
            Ok(CatalogEvent::ReloadRequested) => {
                let sessions = Arc::clone(self.coordinator.sessions());
                self.spawn(async move {
                    sessions.reload().await?;
                    Ok(Work::Done { message: String::new(), quit: false })
                });
            }
            Err(broadcast::error::RecvError::Closed) => self.quit = true,
        }
    }
}

/// Restores the terminal however the UI exits.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        if let Err(e) = execute!(std::io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e.into());
        }
        Ok(TerminalGuard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(std::io::stdout(), LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

fn spawn_input(events: mpsc::UnboundedSender<UiEvent>, stop: CancellationToken) {
    tokio::task::spawn_blocking(move || {
        while !stop.is_cancelled() {
            match event::poll(INPUT_POLL) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    warn!(target: "muxctx::ui", "terminal input: {e}");
                    break;
                }
            }
            let event = match event::read() {
                Ok(Event::Key(key)) => UiEvent::Key(key),
                Ok(Event::Resize(..)) => UiEvent::Resize,
                Ok(_) => continue,
                Err(e) => {
                    warn!(target: "muxctx::ui", "terminal input: {e}");
                    break;
                }
            };
            if events.send(event).is_err() {
                break;
            }
        }
    });
}

/// Run the UI until the user quits or attaches somewhere.
pub async fn run(
    coordinator: Arc<Coordinator>,
    settings: &Settings,
    manage_contexts: bool,
    mode: Mode,
) -> Result<()> {
    let (width, height) = crossterm::terminal::size()?;
    check_size(width, height)?;

    let completer = match Completer::from_settings(&settings.completion) {
        Ok(completer) => Some(Arc::new(completer)),
        Err(e) => {
            debug!(target: "muxctx::ui", "completions disabled: {e}");
            None
        }
    };
    let border = settings
        .popup
        .border_color
        .parse::<Color>()
        .unwrap_or(Color::Blue);
    let cwd = std::env::current_dir().or_else(|_| dirs::home_dir().ok_or(MuxctxError::NoConfigDir))?;

    let (events, mut inbox) = mpsc::unbounded_channel();
    let mut catalog = coordinator.sessions().subscribe();
    let mut view = View::new(border);
    view.manage_contexts = manage_contexts;
    let mut app = App {
        coordinator: Arc::clone(&coordinator),
        completer,
        repositories: settings.repositories.clone(),
        mode,
        router: Router::new(cwd),
        view,
        events: events.clone(),
        completion: CancellationToken::new(),
        discovery: CancellationToken::new(),
        creating: false,
        quit: false,
    };
    if mode == Mode::Picker {
        app.on_key(KeyEvent::new(
            crossterm::event::KeyCode::Char('n'),
            crossterm::event::KeyModifiers::CONTROL,
        ));
    }
    app.spawn({
        let sessions = Arc::clone(coordinator.sessions());
        async move {
            sessions.reload().await?;
            Ok(Work::Done { message: String::new(), quit: false })
        }
    });

    let _guard = TerminalGuard::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(std::io::stdout()))?;
    let stop = CancellationToken::new();
    spawn_input(events, stop.clone());
    let mut tick = tokio::time::interval(TICK);

    let result = loop {
        app.view.toasts.prune(Instant::now());
        if let Err(e) = terminal.draw(|frame| draw(frame, &app.view, &app.router)) {
            break Err(e.into());
        }
        tokio::select! {
            event = inbox.recv() => match event {
                Some(UiEvent::Key(key)) => app.on_key(key),
                Some(UiEvent::Resize) => {}
                Some(UiEvent::Done(work)) => app.on_done(work),
                None => break Ok(()),
            },
            event = catalog.recv() => app.on_catalog(event),
            _ = tick.tick() => {}
        }
        if app.quit {
            break Ok(());
        }
    };
    stop.cancel();
    app.completion.cancel();
    app.discovery.cancel();
    result
}
