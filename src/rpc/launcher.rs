//! Helper process launcher.
//!
//! Starts the knowledge-base helper with:
//! - an explicit, ordered list of [`LaunchStrategy`] candidates: the first
//!   whose executable resolves is spawned, the rest are never tried;
//! - the caller's full environment, so session and authentication variables
//!   the helper needs reach it implicitly;
//! - piped stdin/stdout/stderr and `kill_on_drop(true)`;
//! - a liveness check after a short grace period: a helper that has already
//!   exited is reported as [`AppError::ProcessExitedImmediately`] with its
//!   stderr output instead of letting the handshake wait on a dead pipe.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::{BridgeConfig, LaunchStrategy};
use crate::rpc::process::{HelperProcess, StderrTail};
use crate::{AppError, Result};

/// Time allowed for stderr to be fully drained from a helper that exited
/// during the grace period.
const EXITED_STDERR_SETTLE: Duration = Duration::from_secs(1);

/// Concrete command line chosen from the strategy list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Resolved executable path.
    pub program: PathBuf,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
}

/// Pick the first strategy whose executable resolves.
///
/// # Errors
///
/// Returns [`AppError::ProcessSpawnFailure`] when none resolves.
pub fn resolve_invocation(strategies: &[LaunchStrategy]) -> Result<Invocation> {
    for strategy in strategies {
        match find_executable(strategy.program()) {
            Some(program) => {
                debug!(program = %program.display(), "launcher: strategy resolved");
                return Ok(Invocation {
                    program,
                    args: strategy.args(),
                });
            }
            None => {
                debug!(
                    program = strategy.program(),
                    "launcher: executable not found, trying next strategy"
                );
            }
        }
    }

    let tried: Vec<&str> = strategies.iter().map(LaunchStrategy::program).collect();
    Err(AppError::ProcessSpawnFailure(format!(
        "no launch strategy resolved (tried: {})",
        tried.join(", ")
    )))
}

/// Resolve and spawn the helper, then verify it survives the grace period.
///
/// # Errors
///
/// - [`AppError::ProcessSpawnFailure`]: nothing resolved, the OS refused
///   to start the process, or a standard stream could not be piped.
/// - [`AppError::ProcessExitedImmediately`]: the helper exited before
///   `startup_grace_ms` elapsed.
/// - [`AppError::Io`]: the liveness poll itself failed.
pub async fn launch(config: &BridgeConfig) -> Result<HelperProcess> {
    let invocation = resolve_invocation(&config.launch)?;
    let program = invocation.program.display().to_string();
    let span = info_span!("launch_helper", program = program.as_str());

    spawn_checked(invocation, program.clone(), config.startup_grace())
        .instrument(span)
        .await
}

async fn spawn_checked(
    invocation: Invocation,
    program: String,
    grace: Duration,
) -> Result<HelperProcess> {
    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::ProcessSpawnFailure(format!("failed to spawn {program}: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::ProcessSpawnFailure("failed to capture helper stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::ProcessSpawnFailure("failed to capture helper stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::ProcessSpawnFailure("failed to capture helper stderr".into()))?;

    let mut stderr = StderrTail::spawn(stderr, program.clone());

    tokio::time::sleep(grace).await;

    match child.try_wait() {
        Ok(None) => {
            info!(pid = child.id(), "launcher: helper spawned");
            Ok(HelperProcess::new(program, child, stdin, stdout, stderr))
        }
        Ok(Some(status)) => {
            let stderr = stderr.collect(EXITED_STDERR_SETTLE).await;
            warn!(%status, "launcher: helper exited during startup grace period");
            Err(AppError::ProcessExitedImmediately {
                exit_code: status.code(),
                stderr,
            })
        }
        Err(err) => Err(AppError::Io(format!("failed to poll helper status: {err}"))),
    }
}

/// Locate `program`: a value containing a path separator must name an
/// existing executable file; a bare name is searched on `PATH`.
fn find_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path = env::var_os("PATH")?;
    env::split_paths(&path).find_map(|dir| {
        executable_names(program)
            .into_iter()
            .map(|name| dir.join(name))
            .find(|full| is_executable(full))
    })
}

#[cfg(unix)]
fn executable_names(program: &str) -> Vec<String> {
    vec![program.to_owned()]
}

#[cfg(not(unix))]
fn executable_names(program: &str) -> Vec<String> {
    vec![program.to_owned(), format!("{program}.exe"), format!("{program}.cmd")]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
