//! Shell completions harvested from a captive zsh.
//!
//! Each request writes the driver script to its own temporary file and runs
//! `<shell> <script> <partial>`; the script prints one `option -- description`
//! line per candidate. The child runs in its own process group so that the
//! whole tree can be killed when the deadline passes or the caller cancels.

use crate::config::CompletionSettings;
use crate::error::{MuxctxError, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The default driver, run by zsh.
pub const ZSH_DRIVER: &str = include_str!("completion.zsh");

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for a killed child to be reaped.
const REAP_GRACE: Duration = Duration::from_millis(500);

/// One candidate offered by the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub option: String,
    pub description: String,
    /// The caller's input with its current word replaced by this candidate.
    pub replacement: String,
}

#[derive(Debug, Clone)]
pub struct Completer {
    shell: PathBuf,
    script: String,
    timeout: Duration,
}

impl Completer {
    /// Use `zsh` from `PATH`.
    pub fn detect() -> Result<Self> {
        let shell = which::which("zsh").map_err(|_| MuxctxError::MissingShell)?;
        Ok(Completer::new(shell))
    }

    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Completer {
            shell: shell.into(),
            script: ZSH_DRIVER.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_settings(settings: &CompletionSettings) -> Result<Self> {
        let completer = match &settings.shell {
            Some(shell) if shell.exists() => Completer::new(shell),
            Some(_) => return Err(MuxctxError::MissingShell),
            None => Completer::detect()?,
        };
        Ok(completer.with_timeout(Duration::from_millis(settings.timeout_ms)))
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = script.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Completions for `partial`, in the order the shell produced them.
    ///
    /// Returns [`MuxctxError::Timeout`] once the deadline passes and
    /// [`MuxctxError::Cancelled`] when `cancel` fires; in both cases the child
    /// and everything it spawned are killed before returning.
    pub async fn complete(
        &self,
        partial: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Completion>> {
        let deadline = Instant::now() + self.timeout;

        let mut script = tempfile::Builder::new()
            .prefix("muxctx-complete-")
            .suffix(".zsh")
            .tempfile()?;
        script.write_all(self.script.as_bytes())?;
        script.flush()?;

        let mut child = Command::new(&self.shell)
            .arg(script.path())
            .arg(partial)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MuxctxError::MissingShell,
                _ => MuxctxError::Io(e),
            })?;
        debug!(target: "muxctx::completion", "completing {partial:?} with pid {:?}", child.id());

        let interrupted = tokio::select! {
            output = collect(&mut child) => {
                let output = output?;
                if !output.status.success() {
                    return Err(MuxctxError::exec("completion shell", &output));
                }
                return Ok(parse_completions(partial, &String::from_utf8_lossy(&output.stdout)));
            }
            _ = tokio::time::sleep_until(deadline) => {
                MuxctxError::Timeout(format!("completing {partial:?}"))
            }
            _ = cancel.cancelled() => MuxctxError::Cancelled,
        };

        kill_group(&mut child);
        if tokio::time::timeout(REAP_GRACE, child.wait()).await.is_err() {
            warn!(target: "muxctx::completion", "completion shell did not exit after kill");
        }
        Err(interrupted)
    }
}

async fn collect(child: &mut Child) -> Result<Output> {
    let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(MuxctxError::Io(std::io::Error::other("child pipes missing")));
    };
    let mut out = Vec::new();
    let mut err = Vec::new();
    let (read_out, read_err) =
        tokio::join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err));
    read_out?;
    read_err?;
    let status = child.wait().await?;
    Ok(Output {
        status,
        stdout: out,
        stderr: err,
    })
}

fn kill_group(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: kill(2) takes no pointers; the group was created by process_group(0).
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }
    let _ = child.start_kill();
}

/// Parse driver output for the input `partial`.
///
/// Lines are `option [" -- " description]`; lines with an empty option are
/// skipped. When `partial` ends in `-`, one leading `-` is dropped from
/// options, since the shell repeats the dash the user already typed.
pub fn parse_completions(partial: &str, output: &str) -> Vec<Completion> {
    let word_start = partial
        .rfind(char::is_whitespace)
        .map_or(0, |i| i + partial[i..].chars().next().map_or(1, char::len_utf8));
    let head = &partial[..word_start];

    output
        .lines()
        .filter_map(|line| {
            let line = line.trim_end_matches('\r');
            let (candidate, description) = match line.split_once(" -- ") {
                Some((option, description)) => (option.trim(), description.trim()),
                None => (line.trim(), ""),
            };
            if candidate.is_empty() {
                return None;
            }
            let option = match candidate.strip_prefix('-') {
                Some(rest) if partial.ends_with('-') => rest,
                _ => candidate,
            };
            Some(Completion {
                option: option.to_string(),
                description: description.to_string(),
                replacement: format!("{head}{candidate}"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Completer {
        Completer::new("/bin/sh").with_script(script)
    }

    #[test]
    fn test_parse_skips_empty_options() {
        let out = "pods -- Pods\n -- nothing\n\npodtemplates\r\n";
        let items = parse_completions("kubectl get po", out);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].option, "pods");
        assert_eq!(items[0].description, "Pods");
        assert_eq!(items[0].replacement, "kubectl get pods");
        assert_eq!(items[1].option, "podtemplates");
        assert_eq!(items[1].description, "");
    }

    #[test]
    fn test_parse_strips_repeated_dash() {
        let items = parse_completions("ls -", "-a -- all\n--color -- colorize\nfile\n");
        assert_eq!(items[0].option, "a");
        assert_eq!(items[0].replacement, "ls -a");
        assert_eq!(items[1].option, "-color");
        assert_eq!(items[1].replacement, "ls --color");
        assert_eq!(items[2].option, "file");
    }

    #[test]
    fn test_parse_after_trailing_space() {
        let items = parse_completions("git ", "add -- stage files\n");
        assert_eq!(items[0].replacement, "git add");
    }

    #[tokio::test]
    async fn test_complete_reads_script_output() {
        let completer = sh("printf '%s -- echoed\\n' \"$1\"\nprintf 'other\\n'\n");
        let items = completer
            .complete("kubectl", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].option, "kubectl");
        assert_eq!(items[0].description, "echoed");
        assert_eq!(items[1].option, "other");
    }

    /// Gone, or a zombie nobody has reaped yet.
    fn is_dead(pid: libc::pid_t) -> bool {
        // SAFETY: signal 0 only checks that the process exists.
        if unsafe { libc::kill(pid, 0) } == -1 {
            return std::io::Error::last_os_error().raw_os_error() == Some(libc::ESRCH);
        }
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .map(|stat| stat.rsplit(')').next().is_some_and(|rest| rest.trim_start().starts_with('Z')))
            .unwrap_or(false)
    }

    fn read_pid(path: &std::path::Path) -> libc::pid_t {
        std::fs::read_to_string(path).unwrap().trim().parse().unwrap()
    }

    #[tokio::test]
    async fn test_complete_times_out_and_kills_child() {
        let dir = tempfile::TempDir::new().unwrap();
        let shell_pid = dir.path().join("shell.pid");
        let sleep_pid = dir.path().join("sleep.pid");
        let script = format!(
            "echo $$ > '{}'\nsleep 30 &\necho $! > '{}'\nwait\n",
            shell_pid.display(),
            sleep_pid.display()
        );
        let completer = sh(&script).with_timeout(Duration::from_millis(300));
        let started = std::time::Instant::now();
        let result = completer
            .complete("kubectl get po", &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(MuxctxError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_millis(300) + Duration::from_millis(1000));

        let returned = std::time::Instant::now();
        let pids = [read_pid(&shell_pid), read_pid(&sleep_pid)];
        while !pids.iter().all(|&pid| is_dead(pid)) {
            assert!(
                returned.elapsed() < Duration::from_millis(500),
                "completion processes still running: {pids:?}"
            );
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[tokio::test]
    async fn test_complete_cancelled() {
        let completer = sh("sleep 30\n");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let started = std::time::Instant::now();
        let result = completer.complete("ls", &cancel).await;
        assert!(matches!(result, Err(MuxctxError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_failing_script_is_exec_error() {
        let completer = sh("echo broken >&2\nexit 3\n");
        match completer.complete("x", &CancellationToken::new()).await {
            Err(MuxctxError::Exec { stderr, .. }) => assert_eq!(stderr.trim(), "broken"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_shell() {
        let completer = Completer::new("/nonexistent/zsh");
        let result = completer.complete("x", &CancellationToken::new()).await;
        assert!(matches!(result, Err(MuxctxError::MissingShell)));
    }

    #[test]
    fn test_missing_configured_shell() {
        let settings = CompletionSettings {
            shell: Some(PathBuf::from("/nonexistent/zsh")),
            timeout_ms: 100,
        };
        assert!(matches!(
            Completer::from_settings(&settings),
            Err(MuxctxError::MissingShell)
        ));
    }
}
