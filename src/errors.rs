//! Error types shared across the bridge.

use std::fmt::{Display, Formatter};

/// Shared bridge result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Bridge error enumeration covering every failure mode of one query.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or stream I/O failure.
    Io(String),
    /// Protocol misuse or outbound serialisation failure.
    Rpc(String),
    /// No launch strategy resolved, or the helper could not be started with
    /// piped standard streams.
    ProcessSpawnFailure(String),
    /// The helper exited before the startup grace period elapsed.
    ProcessExitedImmediately {
        /// Exit code, when the process was not terminated by a signal.
        exit_code: Option<i32>,
        /// Captured stderr output.
        stderr: String,
    },
    /// The helper closed its stdout before acknowledging `initialize`.
    EofBeforeHandshake {
        /// Tail of the helper's stderr output.
        stderr: String,
    },
    /// A stdout line was not a JSON-RPC response. Filtered by the channel and
    /// never returned from a query.
    MalformedLine(String),
    /// The helper answered the tool call with an `error` payload.
    ToolError(String),
    /// The helper closed its stdout before answering the tool call.
    StreamClosedDuringCall {
        /// Tail of the helper's stderr output.
        stderr: String,
    },
    /// A handshake or tool-call deadline elapsed.
    Timeout(String),
    /// The caller cancelled the query while it was in flight.
    Cancelled,
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Rpc(msg) => write!(f, "rpc: {msg}"),
            Self::ProcessSpawnFailure(msg) => write!(f, "process spawn failure: {msg}"),
            Self::ProcessExitedImmediately { exit_code, stderr } => {
                match exit_code {
                    Some(code) => write!(f, "process exited immediately with code {code}")?,
                    None => write!(f, "process exited immediately (terminated by signal)")?,
                }
                write_stderr(f, stderr)
            }
            Self::EofBeforeHandshake { stderr } => {
                write!(f, "helper closed stdout before handshake completed")?;
                write_stderr(f, stderr)
            }
            Self::MalformedLine(msg) => write!(f, "malformed line: {msg}"),
            Self::ToolError(msg) => write!(f, "tool error: {msg}"),
            Self::StreamClosedDuringCall { stderr } => {
                write!(f, "helper closed stdout before answering the tool call")?;
                write_stderr(f, stderr)
            }
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Cancelled => write!(f, "cancelled: query abandoned by caller"),
        }
    }
}

/// Append ` | stderr: …` when the helper wrote anything to stderr.
fn write_stderr(f: &mut Formatter<'_>, stderr: &str) -> std::fmt::Result {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        Ok(())
    } else {
        write!(f, " | stderr: {trimmed}")
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Rpc(format!("json serialisation failed: {err}"))
    }
}
