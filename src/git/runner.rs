//! Cancellable git process runner.
//!
//! Spawns the `git` binary with piped stdio and `kill_on_drop(true)`.
//! Stdout and stderr are drained concurrently while the process runs, so
//! commands with large output never deadlock on a full pipe. Cooperative
//! cancellation terminates the whole process group.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{AppError, Result};

static GIT_BINARY: OnceLock<PathBuf> = OnceLock::new();

/// Captured result of one git invocation that ran to completion.
///
/// A non-zero exit status is an ordinary outcome, not an error — callers
/// inspect [`success`](Self::success) and decide. Only failure to start
/// the process or cancellation surface as [`AppError`] values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    /// Process exit code (`-1` when terminated by a signal).
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl GitOutput {
    /// Whether the command exited with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Trimmed standard output, the common shape for `rev-parse`-style
    /// single-value queries.
    #[must_use]
    pub fn trimmed_stdout(&self) -> String {
        self.stdout.trim().to_owned()
    }
}

/// Executes git commands against a working directory.
#[derive(Debug, Clone)]
pub struct GitRunner {
    binary: PathBuf,
}

impl Default for GitRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl GitRunner {
    /// Create a runner using the process-wide cached binary path.
    ///
    /// The absolute path is resolved from `PATH` once per process; when
    /// resolution fails the bare name is used and spawn errors surface as
    /// [`AppError::GitUnavailable`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: GIT_BINARY.get_or_init(resolve_git_binary).clone(),
        }
    }

    /// Create a runner invoking an explicit binary path, bypassing `PATH`
    /// resolution. For hosts that ship a bundled git.
    #[must_use]
    pub fn with_binary(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// The resolved git binary path.
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run a git command to completion.
    ///
    /// # Errors
    ///
    /// Returns `AppError::GitUnavailable` if the process cannot be
    /// started, `AppError::Cancelled` if the token fires first (the
    /// process group is terminated before returning), or `AppError::Io`
    /// if reading the pipes fails. A non-zero exit status is returned as
    /// `Ok` — see [`GitOutput`].
    pub async fn exec(
        &self,
        args: &[&str],
        cwd: &Path,
        cancel: &CancellationToken,
    ) -> Result<GitOutput> {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|err| {
            AppError::GitUnavailable(format!(
                "failed to start {}: {err}",
                self.binary.display()
            ))
        })?;
        let pid = child.id();

        let mut stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Io("git stdout pipe missing".into()))?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Io("git stderr pipe missing".into()))?;

        // Drain both pipes while waiting, never one after the other.
        let io = async {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            let (out_read, err_read) = tokio::join!(
                stdout_pipe.read_to_end(&mut stdout),
                stderr_pipe.read_to_end(&mut stderr),
            );
            out_read?;
            err_read?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, stdout, stderr))
        };

        let completed = tokio::select! {
            () = cancel.cancelled() => None,
            res = io => Some(res),
        };

        match completed {
            None => {
                kill_process_group(pid);
                let _ = child.start_kill();
                let _ = child.wait().await;
                debug!(args = ?args, "git command cancelled");
                Err(AppError::Cancelled)
            }
            Some(Ok((status, stdout, stderr))) => {
                let output = GitOutput {
                    exit_code: status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                };
                if !output.success() {
                    debug!(
                        args = ?args,
                        exit_code = output.exit_code,
                        stderr = %output.stderr.trim(),
                        "git command reported an error"
                    );
                }
                Ok(output)
            }
            Some(Err(err)) => Err(AppError::Io(format!("git pipe read failed: {err}"))),
        }
    }

    /// Run a git command and require a zero exit status.
    ///
    /// # Errors
    ///
    /// Everything `exec` returns, plus `AppError::Git` carrying the first
    /// stderr line when the command reports a non-zero status.
    pub async fn exec_checked(
        &self,
        args: &[&str],
        cwd: &Path,
        cancel: &CancellationToken,
    ) -> Result<GitOutput> {
        let output = self.exec(args, cwd, cancel).await?;
        if output.success() {
            Ok(output)
        } else {
            let detail = output
                .stderr
                .lines()
                .next()
                .unwrap_or("no error output")
                .to_owned();
            Err(AppError::Git(format!(
                "`git {}` exited with {}: {detail}",
                args.join(" "),
                output.exit_code
            )))
        }
    }
}

/// Scan `PATH` for the git executable, falling back to the bare name.
fn resolve_git_binary() -> PathBuf {
    let name = if cfg!(windows) { "git.exe" } else { "git" };
    let resolved = env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths)
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    });
    match resolved {
        Some(path) => path,
        None => {
            warn!("git not found on PATH; falling back to bare name");
            PathBuf::from(name)
        }
    }
}

/// Terminate the process group started by `exec`.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    let Ok(raw) = i32::try_from(pid) else { return };
    if let Err(err) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        debug!(pid = raw, %err, "killpg failed (process may have exited)");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
