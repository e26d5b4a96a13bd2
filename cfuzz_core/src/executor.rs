use crate::substitution::RenderedCommand;
use async_trait::async_trait;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Exit code recorded for a clean exit.
pub const EXIT_SUCCESS: &str = "0";

/// Exit code recorded when the deadline expired and the process was killed.
pub const TIMEOUT_EXIT_CODE: &str = "signal: killed";

/// How long pipe readers may keep draining once the process group is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Deadline distance used when the configured timeout does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The outcome of running one task. Created once, then only read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Display form of the substituted value(s).
    pub substitution: String,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Wall-clock time, or exactly the configured timeout when `timed_out`.
    pub elapsed: Duration,
    /// `"0"` on success, otherwise a description of how the execution failed.
    pub exit_code: String,
    pub timed_out: bool,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.exit_code == EXIT_SUCCESS
    }

    pub fn stdout_len(&self) -> usize {
        self.stdout.len()
    }

    pub fn stderr_len(&self) -> usize {
        self.stderr.len()
    }

    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    fn failed_to_start(substitution: String, error: String, elapsed: Duration) -> Self {
        Self {
            substitution,
            stdout: Vec::new(),
            stderr: Vec::new(),
            elapsed,
            exit_code: error.clone(),
            timed_out: false,
            error: Some(error),
        }
    }
}

/// Runs a rendered command and reports what happened.
///
/// Implementations never fail: every problem, including being unable to start
/// the process, is recorded in the returned [`ExecutionResult`].
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, substitution: String, command: RenderedCommand) -> ExecutionResult;
}

/// Executes commands as `<shell> -c <command>` with a per-execution deadline.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    timeout: Duration,
}

type SharedBuffer = Arc<Mutex<Vec<u8>>>;

fn drain<R>(pipe: Option<R>, buffer: SharedBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut pipe) = pipe else {
            return;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..n]),
                Err(e) => {
                    debug!("pipe read failed: {e}");
                    break;
                }
            }
        }
    })
}

/// The rendered command as a process argument, bytes preserved on unix.
#[cfg(unix)]
fn shell_argument(command: &[u8]) -> Cow<'_, OsStr> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(OsStr::from_bytes(command))
}

#[cfg(not(unix))]
fn shell_argument(command: &[u8]) -> Cow<'_, OsStr> {
    Cow::Owned(String::from_utf8_lossy(command).into_owned().into())
}

fn take(buffer: &SharedBuffer) -> Vec<u8> {
    std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner))
}

/// Maps a non-successful exit status to its description, `None` on success.
fn describe_exit(status: ExitStatus) -> Option<String> {
    if status.success() {
        return None;
    }
    if let Some(code) = status.code() {
        return Some(format!("exit status {code}"));
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(format!("signal: {signal}"));
        }
    }
    Some("exited abnormally".to_string())
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>, timeout: Duration) -> Self {
        Self {
            shell: shell.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command(&self, rendered: &RenderedCommand) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(shell_argument(&rendered.command))
            .stdin(if rendered.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout also reaches whatever the shell spawned.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    /// Kills everything in the command's process group, then the shell itself.
    ///
    /// `group` is the shell's pid captured at spawn time; it stays valid as
    /// the group id after the shell has been reaped.
    async fn terminate(child: &mut Child, group: Option<u32>) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, killpg};
            use nix::unistd::Pid;
            if let Some(pgid) = group {
                if let Err(e) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
                    debug!(pgid, "killpg failed: {e}");
                }
            }
        }
        #[cfg(not(unix))]
        let _ = group;
        if let Err(e) = child.kill().await {
            debug!("kill failed: {e}");
        }
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    async fn execute(&self, substitution: String, rendered: RenderedCommand) -> ExecutionResult {
        let start = Instant::now();
        let deadline = start
            .checked_add(self.timeout)
            .unwrap_or_else(|| start + FAR_FUTURE);

        let mut child = match self.command(&rendered).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(shell = %self.shell, "failed to spawn command: {e}");
                return ExecutionResult::failed_to_start(
                    substitution,
                    e.to_string(),
                    start.elapsed(),
                );
            }
        };

        let group = child.id();
        let stdout = SharedBuffer::default();
        let stderr = SharedBuffer::default();
        let mut stdout_reader = drain(child.stdout.take(), Arc::clone(&stdout));
        let mut stderr_reader = drain(child.stderr.take(), Arc::clone(&stderr));

        if let (Some(mut pipe), Some(payload)) = (child.stdin.take(), rendered.stdin) {
            tokio::spawn(async move {
                // The child may exit without reading its input; a broken pipe is expected then.
                if let Err(e) = pipe.write_all(&payload).await {
                    debug!("stdin write failed: {e}");
                }
            });
        }

        let waited = tokio::time::timeout_at(deadline, child.wait()).await;
        let timed_out = waited.is_err();
        if timed_out {
            debug!(%substitution, timeout = ?self.timeout, "deadline reached, killing");
            Self::terminate(&mut child, group).await;
        }

        // Background processes can hold the pipes open after the shell exits.
        let drain_deadline = if timed_out {
            Instant::now() + DRAIN_GRACE
        } else {
            deadline
        };
        let drained = tokio::time::timeout_at(drain_deadline, async {
            let _ = (&mut stdout_reader).await;
            let _ = (&mut stderr_reader).await;
        })
        .await;
        if drained.is_err() {
            if !timed_out {
                Self::terminate(&mut child, group).await;
            }
            stdout_reader.abort();
            stderr_reader.abort();
        }

        let elapsed = if timed_out {
            self.timeout
        } else {
            start.elapsed()
        };

        let (exit_code, error) = match waited {
            Err(_) => (
                TIMEOUT_EXIT_CODE.to_string(),
                Some(TIMEOUT_EXIT_CODE.to_string()),
            ),
            Ok(Err(e)) => (e.to_string(), Some(e.to_string())),
            Ok(Ok(status)) => match describe_exit(status) {
                None => (EXIT_SUCCESS.to_string(), None),
                Some(description) => (description.clone(), Some(description)),
            },
        };

        debug!(%substitution, %exit_code, ?elapsed, timed_out, "execution finished");

        ExecutionResult {
            substitution,
            stdout: take(&stdout),
            stderr: take(&stderr),
            elapsed,
            exit_code,
            timed_out,
            error,
        }
    }
}
