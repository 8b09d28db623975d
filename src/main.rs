//! muxctx CLI entry point.
//!
//! This binary provides the `muxctx` command: a tmux session manager that
//! gives every session its own kubeconfig.

use clap::Parser;
use muxctx::cli::{self, Cli, Command};
use muxctx::config::Settings;
use muxctx::coordinator::{Coordinator, CoordinatorOptions, Dialog, RepoTarget};
use muxctx::kube::KubeStore;
use muxctx::logging::{LogConfig, LogDestination};
use muxctx::manifest::ManifestStore;
use muxctx::session::SessionManager;
use muxctx::tmux::{self, Multiplexer, Tmux};
use muxctx::ui::{self, Mode};
use muxctx::{MuxctxError, Result, loader, logging};
use std::io::{BufRead, Write};
use std::sync::Arc;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        if !e.is_silent() {
            eprintln!("Error: {}", e);
        }
        std::process::exit(e.exit_code());
    }
}

/// Main application logic.
fn run(cli: &Cli) -> Result<()> {
    let destination = if cli.is_fullscreen() {
        LogDestination::default_file()?
    } else {
        LogDestination::Stderr
    };
    logging::init(&LogConfig::new(cli.verbose, destination))?;
    let settings = loader::load_default_settings()?;

    if cli.wants_popup() && tmux::in_tmux() {
        return relaunch_in_popup(&settings);
    }

    match cli.command() {
        Command::Config => edit_config(),
        command => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(dispatch(command, settings)),
    }
}

/// Re-run the same command line inside a tmux popup.
fn relaunch_in_popup(settings: &Settings) -> Result<()> {
    let program = std::env::current_exe()?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    let popup = cli::popup(&program.to_string_lossy(), &args, &settings.popup);
    Tmux::locate()?.display_popup(&popup)
}

/// Open the settings file in `$VISUAL`, `$EDITOR` or `vi`, then check it
/// still parses.
fn edit_config() -> Result<()> {
    let path = loader::ensure_config_file()?;
    let editor = std::env::var("VISUAL")
        .or_else(|_| std::env::var("EDITOR"))
        .unwrap_or_else(|_| "vi".into());
    let mut words = editor.split_whitespace();
    let program = words.next().unwrap_or("vi");
    let status = std::process::Command::new(program)
        .args(words)
        .arg(&path)
        .status()?;
    if !status.success() {
        return Err(MuxctxError::Exec {
            stdout: String::new(),
            stderr: format!("exited with {status}"),
            cause: format!("{program} {}", path.display()),
        });
    }

    let home = dirs::home_dir().ok_or(MuxctxError::NoConfigDir)?;
    loader::load_settings(&path, &home)?;
    Ok(())
}

/// Asks on stderr and reads the answer from stdin.
struct TerminalDialog;

impl Dialog for TerminalDialog {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        let mut stderr = std::io::stderr();
        write!(stderr, "{prompt} [y/N] ")?;
        stderr.flush()?;
        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
    }
}

async fn dispatch(command: Command, settings: Settings) -> Result<()> {
    let mux: Arc<dyn Multiplexer> = Arc::new(Tmux::locate()?);
    let store = Arc::new(ManifestStore::new(&settings.sessions.manifest));
    let manifest = store.load()?;
    let sessions = Arc::new(SessionManager::new(Arc::clone(&mux), settings.sessions.sort));
    let coordinator = Arc::new(Coordinator::new(
        sessions,
        KubeStore::from_home()?,
        store.clone(),
        CoordinatorOptions::new(&settings, &manifest),
    ));

    match command {
        Command::Create { sessions } if sessions.is_empty() => {
            ui::run(coordinator, &settings, manifest.manage_session_kube_context, Mode::Picker).await
        }
        Command::Create { sessions } => {
            let cwd = std::env::current_dir()?;
            let targets = sessions
                .iter()
                .map(|arg| RepoTarget::parse(arg, &cwd))
                .collect::<Result<Vec<_>>>()?;
            for target in &targets {
                coordinator.create_or_attach(target).await?;
            }
            Ok(())
        }
        Command::Kill { force, session } => {
            let session = match session.or_else(|| mux.current_session()) {
                Some(session) => session,
                None => return Err(MuxctxError::NotFound("no session to kill".into())),
            };
            match coordinator.kill(&session, force, &TerminalDialog).await {
                Err(MuxctxError::Cancelled) => Ok(()),
                other => other,
            }
        }
        Command::Load => coordinator.load(&manifest).await,
        Command::Save => {
            let saved = coordinator.save(&store).await?;
            println!(
                "Saved {} sessions to {}",
                saved.sessions.len(),
                store.path().display()
            );
            Ok(())
        }
        Command::Manage => {
            ui::run(coordinator, &settings, manifest.manage_session_kube_context, Mode::Manage).await
        }
        Command::Menu => {
            let program = std::env::current_exe()?;
            mux.display_menu(&cli::menu(&program.to_string_lossy(), &settings.popup))
        }
        Command::Refresh { send_vars } => {
            coordinator
                .refresh(manifest.create_session_kube_config, send_vars)
                .await
        }
        Command::Config => edit_config(),
    }
}
