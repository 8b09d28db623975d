//! Command-line interface for muxctx.
//!
//! Parses arguments using clap and provides the [`Cli`] struct containing
//! all user-specified options.

use crate::config::PopupSettings;
use crate::tmux::{Menu, MenuItem, Popup, shell_quote};
use clap::{ArgAction, Parser, Subcommand};

/// Command-line arguments for muxctx.
///
/// # Examples
///
/// ```bash
/// # Open the session manager (in a tmux popup when run inside tmux)
/// muxctx
///
/// # Open or create sessions for two repositories
/// muxctx create api:~/src/api web:~/src/web:"npm run dev"
///
/// # Kill the current session without asking
/// muxctx kill -f
///
/// # Push every session's KUBECONFIG into its running panes
/// muxctx refresh -s
/// ```
#[derive(Parser, Debug)]
#[command(name = "muxctx")]
#[command(version)]
#[command(about = "Tmux session manager with per-session kubeconfigs")]
#[command(long_about = "muxctx manages tmux sessions and gives each one its own kubeconfig.\n\n\
    Sessions can be created from repositories, renamed, killed, saved to a\n\
    manifest and restored from it. Kubernetes contexts can be moved between\n\
    sessions without touching ~/.kube/config.")]
pub struct Cli {
    /// Run in the current terminal instead of a tmux popup.
    #[arg(short = 'n', long, global = true)]
    pub no_popup: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Edit the settings file.
    Config,

    /// Open sessions, creating them if needed. Without arguments, pick a
    /// repository interactively.
    Create {
        /// Session to open; path defaults to the current directory.
        #[arg(value_name = "NAME[:PATH[:COMMAND]]")]
        sessions: Vec<String>,
    },

    /// Kill a session (the current one by default) and delete its kubeconfig.
    Kill {
        /// Do not ask for confirmation.
        #[arg(short, long)]
        force: bool,

        /// Session to kill.
        session: Option<String>,
    },

    /// Restore the sessions saved in the manifest.
    Load,

    /// Open the session manager.
    Manage,

    /// Show a tmux menu of muxctx commands.
    Menu,

    /// Re-source the tmux config and re-export every session's KUBECONFIG.
    Refresh {
        /// Also type the export into running panes.
        #[arg(short, long)]
        send_vars: bool,
    },

    /// Save the live sessions into the manifest.
    Save,
}

impl Cli {
    /// The subcommand to run; `manage` when none is given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Manage)
    }

    /// Whether the command needs a terminal of its own and should move into
    /// a tmux popup when started from a pane.
    pub fn wants_popup(&self) -> bool {
        if self.no_popup {
            return false;
        }
        match self.command() {
            Command::Manage | Command::Config => true,
            Command::Create { sessions } => sessions.is_empty(),
            Command::Kill { force, .. } => !force,
            Command::Load | Command::Menu | Command::Refresh { .. } | Command::Save => false,
        }
    }

    /// Whether the command takes over the screen, so logs must go to a file.
    pub fn is_fullscreen(&self) -> bool {
        match self.command() {
            Command::Manage => true,
            Command::Create { sessions } => sessions.is_empty(),
            _ => false,
        }
    }
}

/// Popup that re-runs `program args... --no-popup`.
pub fn popup(program: &str, args: &[String], settings: &PopupSettings) -> Popup {
    let mut argv = Vec::with_capacity(args.len() + 2);
    argv.push(program.to_string());
    argv.extend(args.iter().cloned());
    argv.push("--no-popup".to_string());
    Popup {
        width: settings.width.clone(),
        height: settings.height.clone(),
        title: settings.title.clone(),
        border_color: settings.border_color.clone(),
        argv,
    }
}

/// tmux command line opening `popup`.
fn popup_command(popup: &Popup) -> String {
    let command: Vec<String> = popup.argv.iter().map(|a| shell_quote(a)).collect();
    format!(
        "display-popup -E -w {} -h {} -T {} -S {} {}",
        shell_quote(&popup.width),
        shell_quote(&popup.height),
        shell_quote(&popup.title),
        shell_quote(&format!("fg={}", popup.border_color)),
        shell_quote(&command.join(" ")),
    )
}

/// The `display-menu` shown by `muxctx menu`.
pub fn menu(program: &str, settings: &PopupSettings) -> Menu {
    let in_popup = |args: &[&str]| {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        popup_command(&popup(program, &args, settings))
    };
    let in_background = |args: &str| {
        format!("run-shell -b {}", shell_quote(&format!("{} {args}", shell_quote(program))))
    };
    let item = |label: &str, key: &str, command: String| MenuItem {
        label: label.to_string(),
        key: key.to_string(),
        command,
    };
    Menu {
        title: settings.title.clone(),
        border: settings.border_color.clone(),
        fg: "default".into(),
        bg: "default".into(),
        items: vec![
            item("Manage sessions", "m", in_popup(&["manage"])),
            item("New session", "n", in_popup(&["create"])),
            item("Kill session", "x", in_popup(&["kill"])),
            item("Refresh", "r", in_background("refresh")),
            item("Refresh and send vars", "R", in_background("refresh -s")),
            item("Save sessions", "s", in_background("save")),
            item("Load sessions", "l", in_background("load")),
            item("Settings", "c", in_popup(&["config"])),
        ],
    }
}
