//! Tmux session, window and pane management.
//!
//! Every interaction with the multiplexer goes through the [`Multiplexer`]
//! trait. The production implementation, [`Tmux`], shells out to the `tmux`
//! binary, waits for it and parses its output; it never retains any state of
//! its own. Keeping the trait narrow lets the session catalog and the
//! coordinator run against an in-memory double in tests.
//!
//! # Targets
//!
//! Targets use tmux's exact-match syntax so that a session named `api` never
//! resolves to `api-gateway`: `=session`, `=session:index` and `%pane`.
//!
//! # Failures
//!
//! - the binary is missing: [`MuxctxError::Unsupported`]
//! - tmux exits non-zero: [`MuxctxError::Exec`] with verbatim stderr
//! - unparseable output: [`MuxctxError::Malformed`]

use crate::ansi;
use crate::error::{MuxctxError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

/// Format for `list-sessions`: `name,nWindows,createdUnix,attached,group,path`.
pub const SESSION_FORMAT: &str = "#{session_name},#{session_windows},#{session_created},#{session_attached},#{session_group},#{session_path}";

/// Format for `list-windows`: `index,flags,name,active,panes`.
pub const WINDOW_FORMAT: &str =
    "#{window_index},#{window_flags},#{window_name},#{window_active},#{window_panes}";

/// Format for `list-panes`. Tab separated since paths and commands may contain commas.
pub const PANE_FORMAT: &str = "#{pane_id}\t#{pane_index}\t#{pane_width}\t#{pane_height}\t#{pane_left}\t#{pane_top}\t#{pane_active}\t#{pane_current_command}\t#{pane_current_path}\t#{pane_start_path}\t#{pane_start_command}";

/// Target a session by exact name.
pub fn session_target(name: &str) -> String {
    format!("={name}")
}

/// Target a window of a session by index.
pub fn window_target(session: &str, index: u32) -> String {
    format!("={session}:{index}")
}

/// Target a pane by its global id.
pub fn pane_target(id: u32) -> String {
    format!("%{id}")
}

/// One line of `list-sessions` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub name: String,
    pub windows: usize,
    /// Creation time, seconds since the epoch.
    pub created: i64,
    pub attached: bool,
    pub group: Option<String>,
    pub path: PathBuf,
}

impl SessionRecord {
    /// Parse a line produced by [`SESSION_FORMAT`].
    pub fn parse(line: &str) -> Result<Self> {
        let malformed = || MuxctxError::Malformed(format!("session line: {line:?}"));
        let fields: Vec<&str> = line.splitn(6, ',').collect();
        let [name, windows, created, attached, group, path] = fields[..] else {
            return Err(malformed());
        };
        if name.is_empty() {
            return Err(malformed());
        }
        Ok(SessionRecord {
            name: name.to_string(),
            windows: windows.parse().map_err(|_| malformed())?,
            created: created.parse().map_err(|_| malformed())?,
            // session_attached is a client count
            attached: attached.parse::<u32>().map_err(|_| malformed())? > 0,
            group: (!group.is_empty()).then(|| group.to_string()),
            path: PathBuf::from(path),
        })
    }
}

/// Window flag set as reported by `#{window_flags}`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WindowFlags(u8);

impl WindowFlags {
    pub const ACTIVITY: WindowFlags = WindowFlags(1);
    pub const BELL: WindowFlags = WindowFlags(1 << 1);
    pub const SILENCE: WindowFlags = WindowFlags(1 << 2);
    pub const CURRENT: WindowFlags = WindowFlags(1 << 3);
    pub const LAST: WindowFlags = WindowFlags(1 << 4);
    pub const MARKED: WindowFlags = WindowFlags(1 << 5);
    pub const ZOOMED: WindowFlags = WindowFlags(1 << 6);

    const CHARS: [(char, WindowFlags); 7] = [
        ('#', Self::ACTIVITY),
        ('!', Self::BELL),
        ('~', Self::SILENCE),
        ('*', Self::CURRENT),
        ('-', Self::LAST),
        ('M', Self::MARKED),
        ('Z', Self::ZOOMED),
    ];

    /// Parse the flag characters. Unknown characters are malformed.
    pub fn parse(s: &str) -> Result<Self> {
        s.chars().try_fold(WindowFlags::default(), |acc, c| {
            Self::CHARS
                .iter()
                .find(|(ch, _)| *ch == c)
                .map(|(_, flag)| WindowFlags(acc.0 | flag.0))
                .ok_or_else(|| MuxctxError::Malformed(format!("window flag {c:?}")))
        })
    }

    pub fn contains(self, other: WindowFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for WindowFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (c, flag) in Self::CHARS {
            if self.contains(flag) {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

/// One line of `list-windows` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRecord {
    pub index: u32,
    pub flags: WindowFlags,
    pub name: String,
    pub active: bool,
    pub panes: usize,
}

impl WindowRecord {
    /// Parse a line produced by [`WINDOW_FORMAT`]. The name may contain commas.
    pub fn parse(line: &str) -> Result<Self> {
        let malformed = || MuxctxError::Malformed(format!("window line: {line:?}"));
        let mut head = line.splitn(3, ',');
        let (Some(index), Some(flags), Some(rest)) = (head.next(), head.next(), head.next()) else {
            return Err(malformed());
        };
        let mut tail = rest.rsplitn(3, ',');
        let (Some(panes), Some(active), Some(name)) = (tail.next(), tail.next(), tail.next()) else {
            return Err(malformed());
        };
        Ok(WindowRecord {
            index: index.parse().map_err(|_| malformed())?,
            flags: WindowFlags::parse(flags)?,
            name: name.to_string(),
            active: active == "1",
            panes: panes.parse().map_err(|_| malformed())?,
        })
    }
}

/// One line of `list-panes` output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaneRecord {
    pub id: u32,
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
    pub active: bool,
    pub current_command: String,
    pub current_path: String,
    pub start_path: String,
    pub start_command: String,
}

impl PaneRecord {
    /// Parse a line produced by [`PANE_FORMAT`].
    pub fn parse(line: &str) -> Result<Self> {
        let malformed = || MuxctxError::Malformed(format!("pane line: {line:?}"));
        let fields: Vec<&str> = line.splitn(11, '\t').collect();
        let [id, index, width, height, x, y, active, cmd, cwd, start_path, start_cmd] = fields[..]
        else {
            return Err(malformed());
        };
        let num = |s: &str| s.parse::<u32>().map_err(|_| malformed());
        Ok(PaneRecord {
            id: parse_pane_id(id)?,
            index: num(index)?,
            width: num(width)?,
            height: num(height)?,
            x: num(x)?,
            y: num(y)?,
            active: active == "1",
            current_command: cmd.to_string(),
            current_path: cwd.to_string(),
            start_path: start_path.to_string(),
            start_command: start_cmd.to_string(),
        })
    }
}

/// Parse a `%N` pane id.
pub fn parse_pane_id(s: &str) -> Result<u32> {
    s.trim()
        .strip_prefix('%')
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| MuxctxError::Malformed(format!("pane id {s:?}")))
}

/// Parameters for `new-session`.
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub name: String,
    pub path: PathBuf,
    /// Command typed into the first window after creation.
    pub command: Option<String>,
    /// Session environment, e.g. `KUBECONFIG`.
    pub env: Vec<(String, String)>,
}

/// Parameters for `display-popup`.
#[derive(Debug, Clone)]
pub struct Popup {
    pub width: String,
    pub height: String,
    pub title: String,
    pub border_color: String,
    /// Program and arguments run inside the popup.
    pub argv: Vec<String>,
}

/// One `display-menu` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub label: String,
    pub key: String,
    pub command: String,
}

/// Parameters for `display-menu`.
#[derive(Debug, Clone)]
pub struct Menu {
    pub title: String,
    pub border: String,
    pub fg: String,
    pub bg: String,
    pub items: Vec<MenuItem>,
}

/// Typed surface over the multiplexer CLI.
///
/// All operations are synchronous: they wait for the child process.
pub trait Multiplexer: Send + Sync {
    fn list_sessions(&self) -> Result<Vec<SessionRecord>>;
    fn list_windows(&self, session: &str) -> Result<Vec<WindowRecord>>;
    fn list_panes(&self, target: &str) -> Result<Vec<PaneRecord>>;
    /// Raw layout descriptor of a window.
    fn window_layout(&self, target: &str) -> Result<String>;
    /// Visible buffer of a pane, escape sequences preserved, clipped to `width`.
    fn capture_pane(&self, pane: u32, width: u32) -> Result<String>;
    fn pane_current_command(&self, pane: u32) -> Result<String>;

    fn create_session(&self, spec: &NewSession) -> Result<()>;
    fn attach_session(&self, name: &str) -> Result<()>;
    fn kill_session(&self, name: &str) -> Result<()>;
    fn kill_window(&self, target: &str) -> Result<()>;
    fn kill_pane(&self, target: &str) -> Result<()>;
    fn rename_session(&self, old: &str, new: &str) -> Result<()>;
    fn rename_window(&self, target: &str, new: &str) -> Result<()>;
    fn set_pane_title(&self, target: &str, title: &str) -> Result<()>;
    fn set_session_environment(&self, session: &str, key: &str, value: &str) -> Result<()>;
    fn get_session_environment(&self, session: &str, key: &str) -> Result<Option<String>>;

    fn has_session(&self, name: &str) -> Result<bool>;
    fn has_window(&self, session: &str, index: u32) -> Result<bool>;
    fn has_pane(&self, window: &str, index: u32) -> Result<bool>;
    /// Session of the current client; `None` when there is none.
    fn current_session(&self) -> Option<String>;
    /// Whether a server is up and answering.
    fn is_running(&self) -> bool;

    fn new_window(&self, session: &str, index: u32, name: &str, path: &Path) -> Result<u32>;
    fn split_window(&self, target: &str, path: &Path, command: Option<&str>) -> Result<u32>;
    fn respawn_pane(&self, target: &str, path: &Path, command: Option<&str>) -> Result<()>;
    fn source_file(&self, path: &Path) -> Result<()>;
    fn send_keys(&self, target: &str, keys: &[&str]) -> Result<()>;
    fn select_layout(&self, target: &str, layout: &str) -> Result<()>;
    fn resize_pane(&self, target: &str, width: u32, height: u32) -> Result<()>;
    fn base_index(&self) -> Result<u32>;
    fn pane_base_index(&self) -> Result<u32>;

    fn display_popup(&self, popup: &Popup) -> Result<()>;
    fn display_menu(&self, menu: &Menu) -> Result<()>;
}

/// Check if we're running inside a tmux pane.
///
/// Checks for a non-empty `TMUX_PANE` environment variable.
pub fn in_tmux() -> bool {
    std::env::var("TMUX_PANE").is_ok_and(|v| !v.is_empty())
}

/// Quote an argument for `sh`.
pub fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// The tmux CLI.
#[derive(Debug, Clone)]
pub struct Tmux {
    bin: PathBuf,
}

impl Tmux {
    /// Find `tmux` on `PATH`.
    ///
    /// # Errors
    ///
    /// [`MuxctxError::Unsupported`] if the binary cannot be found.
    pub fn locate() -> Result<Self> {
        which::which("tmux")
            .map(|bin| Tmux { bin })
            .map_err(|_| MuxctxError::Unsupported("tmux".into()))
    }

    /// Use an explicit binary.
    pub fn with_binary(bin: impl Into<PathBuf>) -> Self {
        Tmux { bin: bin.into() }
    }

    fn raw(&self, args: &[&str]) -> Result<Output> {
        debug!(target: "muxctx::tmux", "tmux {}", args.join(" "));
        Command::new(&self.bin).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MuxctxError::Unsupported("tmux".into())
            } else {
                MuxctxError::Io(e)
            }
        })
    }

    /// Run tmux and return stdout, failing on non-zero exit.
    fn output(&self, args: &[&str]) -> Result<String> {
        let output = self.raw(args)?;
        if !output.status.success() {
            return Err(MuxctxError::exec(args[0], &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run(&self, args: &[&str]) -> Result<()> {
        self.output(args).map(|_| ())
    }

    fn lines(&self, args: &[&str]) -> Result<Vec<String>> {
        Ok(self
            .output(args)?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    fn index_option(&self, args: &[&str]) -> Result<u32> {
        let out = self.output(args)?;
        out.trim()
            .parse()
            .map_err(|_| MuxctxError::Malformed(format!("{} = {:?}", args.join(" "), out.trim())))
    }
}

impl Multiplexer for Tmux {
    fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let output = self.raw(&["list-sessions", "-F", SESSION_FORMAT])?;
        if !output.status.success() {
            // No server means no sessions.
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no server running") || stderr.contains("error connecting") {
                return Ok(Vec::new());
            }
            return Err(MuxctxError::exec("list-sessions", &output));
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(SessionRecord::parse)
            .collect()
    }

    fn list_windows(&self, session: &str) -> Result<Vec<WindowRecord>> {
        self.lines(&["list-windows", "-t", &session_target(session), "-F", WINDOW_FORMAT])?
            .iter()
            .map(|l| WindowRecord::parse(l))
            .collect()
    }

    fn list_panes(&self, target: &str) -> Result<Vec<PaneRecord>> {
        self.lines(&["list-panes", "-t", target, "-F", PANE_FORMAT])?
            .iter()
            .map(|l| PaneRecord::parse(l))
            .collect()
    }

    fn window_layout(&self, target: &str) -> Result<String> {
        let out = self.output(&["display-message", "-p", "-t", target, "#{window_layout}"])?;
        Ok(out.trim().to_string())
    }

    fn capture_pane(&self, pane: u32, width: u32) -> Result<String> {
        let out = self.output(&["capture-pane", "-e", "-p", "-t", &pane_target(pane)])?;
        let width = width as usize;
        Ok(out
            .lines()
            .map(|line| {
                if ansi::display_width(line) > width {
                    ansi::fit(line, width)
                } else {
                    line.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn pane_current_command(&self, pane: u32) -> Result<String> {
        let out = self.output(&[
            "display-message",
            "-p",
            "-t",
            &pane_target(pane),
            "#{pane_current_command}",
        ])?;
        Ok(out.trim().to_string())
    }

    fn create_session(&self, spec: &NewSession) -> Result<()> {
        let path = spec.path.to_string_lossy();
        let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let mut args: Vec<&str> = vec!["new-session", "-d", "-s", &spec.name, "-c", &path];
        for pair in &env {
            args.push("-e");
            args.push(pair);
        }
        self.run(&args)?;

        // The command is typed into the shell so the window survives its exit.
        if let Some(cmd) = spec.command.as_deref().filter(|c| !c.trim().is_empty()) {
            let target = format!("{}:", session_target(&spec.name));
            self.run(&["send-keys", "-t", &target, cmd, "Enter"])?;
        }
        Ok(())
    }

    fn attach_session(&self, name: &str) -> Result<()> {
        let target = session_target(name);
        match self.run(&["switch-client", "-t", &target]) {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!(target: "muxctx::tmux", "switch-client failed ({e}), attaching");
                let status = Command::new(&self.bin)
                    .args(["attach-session", "-t", &target])
                    .status()?;
                if !status.success() {
                    return Err(MuxctxError::Exec {
                        stdout: String::new(),
                        stderr: format!("attach-session exited with {status}"),
                        cause: "attach-session".into(),
                    });
                }
                Ok(())
            }
        }
    }

    fn kill_session(&self, name: &str) -> Result<()> {
        self.run(&["kill-session", "-t", &session_target(name)])
    }

    fn kill_window(&self, target: &str) -> Result<()> {
        self.run(&["kill-window", "-t", target])
    }

    fn kill_pane(&self, target: &str) -> Result<()> {
        self.run(&["kill-pane", "-t", target])
    }

    fn rename_session(&self, old: &str, new: &str) -> Result<()> {
        self.run(&["rename-session", "-t", &session_target(old), new])
    }

    fn rename_window(&self, target: &str, new: &str) -> Result<()> {
        self.run(&["rename-window", "-t", target, new])
    }

    fn set_pane_title(&self, target: &str, title: &str) -> Result<()> {
        self.run(&["select-pane", "-t", target, "-T", title])
    }

    fn set_session_environment(&self, session: &str, key: &str, value: &str) -> Result<()> {
        self.run(&["set-environment", "-t", &session_target(session), key, value])
    }

    fn get_session_environment(&self, session: &str, key: &str) -> Result<Option<String>> {
        let output = self.raw(&["show-environment", "-t", &session_target(session), key])?;
        if !output.status.success() {
            if String::from_utf8_lossy(&output.stderr).contains("unknown variable") {
                return Ok(None);
            }
            return Err(MuxctxError::exec("show-environment", &output));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        // "-KEY" marks a variable removed from the session environment.
        Ok(stdout
            .trim_end()
            .strip_prefix(key)
            .and_then(|rest| rest.strip_prefix('='))
            .map(str::to_string))
    }

    fn has_session(&self, name: &str) -> Result<bool> {
        Ok(self.list_sessions()?.iter().any(|s| s.name == name))
    }

    fn has_window(&self, session: &str, index: u32) -> Result<bool> {
        let output = self.raw(&["list-windows", "-t", &session_target(session), "-F", "#{window_index}"])?;
        if !output.status.success() {
            return Ok(false);
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .any(|l| l.trim().parse() == Ok(index)))
    }

    fn has_pane(&self, window: &str, index: u32) -> Result<bool> {
        let output = self.raw(&["list-panes", "-t", window, "-F", "#{pane_index}"])?;
        if !output.status.success() {
            return Ok(false);
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .any(|l| l.trim().parse() == Ok(index)))
    }

    fn current_session(&self) -> Option<String> {
        self.output(&["display-message", "-p", "#{session_name}"])
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn is_running(&self) -> bool {
        self.raw(&["list-sessions", "-F", "#{session_name}"])
            .is_ok_and(|o| o.status.success())
    }

    fn new_window(&self, session: &str, index: u32, name: &str, path: &Path) -> Result<u32> {
        let path = path.to_string_lossy();
        let out = self.output(&[
            "new-window",
            "-d",
            "-t",
            &window_target(session, index),
            "-n",
            name,
            "-c",
            &path,
            "-P",
            "-F",
            "#{pane_id}",
        ])?;
        parse_pane_id(&out)
    }

    fn split_window(&self, target: &str, path: &Path, command: Option<&str>) -> Result<u32> {
        let path = path.to_string_lossy();
        let mut args: Vec<&str> = vec!["split-window", "-d", "-t", target, "-c", &path, "-P", "-F", "#{pane_id}"];
        if let Some(cmd) = command.filter(|c| !c.is_empty()) {
            args.push(cmd);
        }
        parse_pane_id(&self.output(&args)?)
    }

    fn respawn_pane(&self, target: &str, path: &Path, command: Option<&str>) -> Result<()> {
        let path = path.to_string_lossy();
        let mut args: Vec<&str> = vec!["respawn-pane", "-k", "-t", target, "-c", &path];
        if let Some(cmd) = command.filter(|c| !c.is_empty()) {
            args.push(cmd);
        }
        self.run(&args)
    }

    fn source_file(&self, path: &Path) -> Result<()> {
        self.run(&["source-file", &path.to_string_lossy()])
    }

    fn send_keys(&self, target: &str, keys: &[&str]) -> Result<()> {
        let mut args: Vec<&str> = vec!["send-keys", "-t", target];
        args.extend_from_slice(keys);
        self.run(&args)
    }

    fn select_layout(&self, target: &str, layout: &str) -> Result<()> {
        self.run(&["select-layout", "-t", target, layout])
    }

    fn resize_pane(&self, target: &str, width: u32, height: u32) -> Result<()> {
        self.run(&[
            "resize-pane",
            "-t",
            target,
            "-x",
            &width.to_string(),
            "-y",
            &height.to_string(),
        ])
    }

    fn base_index(&self) -> Result<u32> {
        self.index_option(&["show-options", "-gv", "base-index"])
    }

    fn pane_base_index(&self) -> Result<u32> {
        self.index_option(&["show-options", "-gwv", "pane-base-index"])
    }

    fn display_popup(&self, popup: &Popup) -> Result<()> {
        let border = format!("fg={}", popup.border_color);
        let command = popup
            .argv
            .iter()
            .map(|a| shell_quote(a))
            .collect::<Vec<_>>()
            .join(" ");
        self.run(&[
            "display-popup",
            "-E",
            "-w",
            &popup.width,
            "-h",
            &popup.height,
            "-T",
            &popup.title,
            "-S",
            &border,
            &command,
        ])
    }

    fn display_menu(&self, menu: &Menu) -> Result<()> {
        let style = format!("fg={},bg={}", menu.fg, menu.bg);
        let border = format!("fg={}", menu.border);
        let mut args = vec![
            "display-menu".to_string(),
            "-T".into(),
            menu.title.clone(),
            "-s".into(),
            style,
            "-S".into(),
            border,
        ];
        for item in &menu.items {
            args.push(item.label.clone());
            args.push(item.key.clone());
            args.push(item.command.clone());
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_line() {
        let rec = SessionRecord::parse("core,3,1700000000,1,,/src/core").unwrap();
        assert_eq!(rec.name, "core");
        assert_eq!(rec.windows, 3);
        assert_eq!(rec.created, 1_700_000_000);
        assert!(rec.attached);
        assert_eq!(rec.group, None);
        assert_eq!(rec.path, PathBuf::from("/src/core"));
    }

    #[test]
    fn test_parse_session_line_keeps_commas_in_path() {
        let rec = SessionRecord::parse("x,1,5,0,grp,/tmp/a,b").unwrap();
        assert!(!rec.attached);
        assert_eq!(rec.group.as_deref(), Some("grp"));
        assert_eq!(rec.path, PathBuf::from("/tmp/a,b"));
    }

    #[test]
    fn test_parse_session_line_rejects_garbage() {
        assert!(matches!(
            SessionRecord::parse("only,two"),
            Err(MuxctxError::Malformed(_))
        ));
        assert!(SessionRecord::parse("a,x,1,0,,/").is_err());
    }

    #[test]
    fn test_parse_window_line() {
        let rec = WindowRecord::parse("2,*Z,editor, main,1,3").unwrap();
        assert_eq!(rec.index, 2);
        assert!(rec.flags.contains(WindowFlags::CURRENT));
        assert!(rec.flags.contains(WindowFlags::ZOOMED));
        assert!(!rec.flags.contains(WindowFlags::BELL));
        assert_eq!(rec.name, "editor, main");
        assert!(rec.active);
        assert_eq!(rec.panes, 3);
    }

    #[test]
    fn test_window_flags() {
        let flags = WindowFlags::parse("#!~*-MZ").unwrap();
        assert_eq!(flags.to_string(), "#!~*-MZ");
        assert!(WindowFlags::parse("").unwrap().is_empty());
        assert!(WindowFlags::parse("?").is_err());
    }

    #[test]
    fn test_parse_pane_line() {
        let rec = PaneRecord::parse("%7\t0\t80\t24\t0\t0\t1\tzsh\t/home/u\t/home/u\t").unwrap();
        assert_eq!(rec.id, 7);
        assert_eq!(rec.width, 80);
        assert!(rec.active);
        assert_eq!(rec.current_command, "zsh");
        assert_eq!(rec.start_command, "");
    }

    #[test]
    fn test_parse_pane_id() {
        assert_eq!(parse_pane_id("%12\n").unwrap(), 12);
        assert!(parse_pane_id("12").is_err());
    }

    #[test]
    fn test_targets() {
        assert_eq!(session_target("api"), "=api");
        assert_eq!(window_target("api", 2), "=api:2");
        assert_eq!(pane_target(5), "%5");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("muxctx"), "muxctx");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_missing_binary_is_unsupported() {
        let tmux = Tmux::with_binary("/nonexistent/tmux-binary");
        assert!(matches!(
            tmux.list_sessions(),
            Err(MuxctxError::Unsupported(_))
        ));
    }
}
