//! Owned helper process handle.
//!
//! A [`HelperProcess`] exclusively owns one spawned helper and its three
//! standard streams for the lifetime of a single query. It moves through
//! [`ProcessState`]:
//!
//! ```text
//! Spawned ──initialize──▶ Initializing ──ack──▶ Ready ──call_tool──▶ …
//!                              │
//!                              └──eof / timeout──▶ Failed
//! (any state) ──terminate──▶ Terminated
//! ```
//!
//! [`HelperProcess::terminate`] is the release path every query takes on
//! every exit branch; `kill_on_drop(true)` on the child backs it up if the
//! handle is dropped without it (panic or cancelled future).

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::rpc::channel::RpcChannel;
use crate::rpc::handshake;
use crate::rpc::invoker::{self, ToolCall, ToolOutput};
use crate::{AppError, Result};

/// Time allowed for the helper to exit after SIGTERM before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Time allowed for the stderr drain to reach end of stream when building
/// an error report.
const STDERR_SETTLE: Duration = Duration::from_millis(500);

/// Retained stderr tail, in bytes.
const STDERR_TAIL_BYTES: usize = 16 * 1024;

/// Lifecycle of a helper process within one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Spawned and alive after the startup grace period.
    Spawned,
    /// `initialize` sent, acknowledgment pending.
    Initializing,
    /// Handshake complete; a tool call may be sent.
    Ready,
    /// Handshake failed; only termination remains.
    Failed,
    /// Process signalled to stop and reaped (or already gone).
    Terminated,
}

impl Display for ProcessState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Spawned => "spawned",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

// ── Stderr tail ──────────────────────────────────────────────────────────────

/// Background drain of the helper's stderr.
///
/// Keeps the pipe from filling up (which would stall the helper) and retains
/// the last [`STDERR_TAIL_BYTES`] for error reports.
#[derive(Debug)]
pub struct StderrTail {
    buffer: Arc<Mutex<String>>,
    task: JoinHandle<()>,
}

impl StderrTail {
    /// Start draining `stderr` in a background task.
    #[must_use]
    pub fn spawn(stderr: ChildStderr, program: String) -> Self {
        let buffer = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&buffer);

        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        debug!(program = program.as_str(), line = line.as_str(), "helper stderr");
                        let mut tail = sink.lock().await;
                        tail.push_str(&line);
                        tail.push('\n');
                        trim_front(&mut tail, STDERR_TAIL_BYTES);
                    }
                    Ok(None) => break,
                    Err(err) => {
                        debug!(program = program.as_str(), %err, "helper stderr: read failed, stopping drain");
                        break;
                    }
                }
            }
        });

        Self { buffer, task }
    }

    /// Wait up to `settle` for the drain to reach end of stream, then return
    /// what has been captured.
    pub async fn collect(&mut self, settle: Duration) -> String {
        if !self.task.is_finished() {
            let _ = tokio::time::timeout(settle, &mut self.task).await;
        }
        self.buffer.lock().await.clone()
    }

    fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for StderrTail {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Drop whole leading characters until `text` fits in `max_bytes`.
fn trim_front(text: &mut String, max_bytes: usize) {
    if text.len() <= max_bytes {
        return;
    }
    let mut cut = text.len() - max_bytes;
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    text.drain(..cut);
}

// ── Helper process ───────────────────────────────────────────────────────────

/// Exclusive handle on one spawned helper process.
#[derive(Debug)]
pub struct HelperProcess {
    program: String,
    child: Child,
    channel: RpcChannel<ChildStdin, ChildStdout>,
    stderr: StderrTail,
    state: ProcessState,
}

impl HelperProcess {
    /// Assemble a handle for a freshly spawned, verified-alive child.
    pub(crate) fn new(
        program: String,
        child: Child,
        stdin: ChildStdin,
        stdout: ChildStdout,
        stderr: StderrTail,
    ) -> Self {
        Self {
            program,
            child,
            channel: RpcChannel::new(stdin, stdout),
            stderr,
            state: ProcessState::Spawned,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Executable the helper was launched from.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// OS process id, while the child has not been reaped.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Perform the `initialize` / `initialized` handshake.
    ///
    /// Moves `Spawned → Initializing → Ready`, or to `Failed` on error.
    ///
    /// # Errors
    ///
    /// - [`AppError::Rpc`] if the handle is not in the `Spawned` state.
    /// - [`AppError::EofBeforeHandshake`] (with the stderr tail) if the helper
    ///   closes stdout first.
    /// - [`AppError::Timeout`] if the handshake deadline elapses.
    /// - [`AppError::Io`] if writing to the helper fails.
    pub async fn initialize(&mut self, config: &BridgeConfig) -> Result<()> {
        if self.state != ProcessState::Spawned {
            return Err(AppError::Rpc(format!(
                "cannot initialize helper in state {}",
                self.state
            )));
        }

        self.state = ProcessState::Initializing;
        match handshake::perform(&mut self.channel, config).await {
            Ok(()) => {
                self.state = ProcessState::Ready;
                Ok(())
            }
            Err(err) => {
                self.state = ProcessState::Failed;
                Err(self.with_stderr(err).await)
            }
        }
    }

    /// Send the single tool call and wait for its response.
    ///
    /// # Errors
    ///
    /// - [`AppError::Rpc`] if the handshake has not completed.
    /// - [`AppError::ToolError`], [`AppError::StreamClosedDuringCall`] (with
    ///   the stderr tail), [`AppError::Timeout`] or [`AppError::Io`] from the
    ///   invoker.
    pub async fn call_tool(
        &mut self,
        call: &ToolCall<'_>,
        timeout: Option<Duration>,
    ) -> Result<ToolOutput> {
        if self.state != ProcessState::Ready {
            return Err(AppError::Rpc(format!(
                "tool call attempted before handshake (state {})",
                self.state
            )));
        }

        match invoker::invoke(&mut self.channel, call, timeout).await {
            Ok(output) => Ok(output),
            Err(err) => Err(self.with_stderr(err).await),
        }
    }

    /// Stop the helper and reap it. Idempotent.
    ///
    /// On unix the helper first receives SIGTERM and gets
    /// [`TERMINATE_GRACE`] to exit; it is killed if still running after that.
    /// Elsewhere it is killed directly.
    pub async fn terminate(&mut self) {
        if self.state == ProcessState::Terminated {
            return;
        }
        self.state = ProcessState::Terminated;
        self.stderr.abort();

        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!(program = self.program.as_str(), %status, "helper already exited");
                return;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(program = self.program.as_str(), %err, "failed to poll helper status");
            }
        }

        if send_sigterm(&self.child) {
            if let Ok(Ok(status)) = tokio::time::timeout(TERMINATE_GRACE, self.child.wait()).await
            {
                info!(program = self.program.as_str(), %status, "helper terminated");
                return;
            }
            warn!(
                program = self.program.as_str(),
                "helper ignored SIGTERM, killing"
            );
        }

        if let Err(err) = self.child.kill().await {
            warn!(program = self.program.as_str(), %err, "failed to kill helper");
        } else {
            info!(program = self.program.as_str(), "helper killed");
        }
    }

    /// Fill the stderr field of stream-closure errors with the captured tail.
    async fn with_stderr(&mut self, err: AppError) -> AppError {
        match err {
            AppError::EofBeforeHandshake { .. } => AppError::EofBeforeHandshake {
                stderr: self.stderr.collect(STDERR_SETTLE).await,
            },
            AppError::StreamClosedDuringCall { .. } => AppError::StreamClosedDuringCall {
                stderr: self.stderr.collect(STDERR_SETTLE).await,
            },
            other => other,
        }
    }
}

/// Ask the child to stop. Returns `false` when no signal could be sent.
#[cfg(unix)]
fn send_sigterm(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return false;
    };
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => true,
        Err(err) => {
            debug!(pid, %err, "SIGTERM delivery failed");
            false
        }
    }
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) -> bool {
    false
}
