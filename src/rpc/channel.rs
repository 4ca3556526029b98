//! Bidirectional line channel to a helper process.
//!
//! Outbound messages are serialised to one compact JSON line and flushed
//! immediately. Inbound lines go through [`parse_response_line`] and are
//! filtered down to the response the caller is waiting for.

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

use crate::rpc::codec::RpcCodec;
use crate::rpc::envelope::{parse_response_line, RpcResponse};
use crate::{AppError, Result};

/// Longest slice of a skipped line included in debug logs.
const LOGGED_LINE_CHARS: usize = 200;

/// Line-framed JSON-RPC channel over a writer (helper stdin) and a reader
/// (helper stdout).
///
/// Generic over the stream types so the protocol stages can be exercised
/// against in-memory pipes.
#[derive(Debug)]
pub struct RpcChannel<W, R> {
    outbound: FramedWrite<W, RpcCodec>,
    inbound: FramedRead<R, RpcCodec>,
}

impl<W, R> RpcChannel<W, R>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    /// Wrap a writer/reader pair.
    #[must_use]
    pub fn new(writer: W, reader: R) -> Self {
        Self {
            outbound: FramedWrite::new(writer, RpcCodec::new()),
            inbound: FramedRead::new(reader, RpcCodec::new()),
        }
    }

    /// Serialise `message` as one line and flush it.
    ///
    /// # Errors
    ///
    /// - [`AppError::Rpc`] if serialisation fails.
    /// - [`AppError::Io`] if the write or flush fails (helper gone).
    pub async fn send<M: Serialize>(&mut self, message: &M) -> Result<()> {
        let line = serde_json::to_string(message)?;
        self.outbound.send(line).await.map_err(|e| {
            warn!(error = %e, "rpc channel: write to helper stdin failed");
            AppError::Io(format!("write to helper stdin failed: {e}"))
        })
    }

    /// Next raw line from the helper, or `None` at end of stream.
    ///
    /// Over-long lines and lines that are not UTF-8 never reach the caller:
    /// [`RpcCodec`] drops them while decoding.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] on an unrecoverable read failure.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        self.inbound.next().await.transpose()
    }

    /// Read until a response with `id` arrives.
    ///
    /// Returns `Ok(None)` if the stream ends first. Responses to other ids,
    /// id-less notifications and lines that are not JSON-RPC at all are
    /// skipped: helpers print banners and log output on the same stdout as
    /// protocol traffic.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::next_line`] I/O failures.
    pub async fn wait_for_response(&mut self, id: u64) -> Result<Option<RpcResponse>> {
        while let Some(line) = self.next_line().await? {
            match parse_response_line(&line) {
                Ok(Some(response)) if response.id == id => return Ok(Some(response)),
                Ok(Some(response)) => {
                    debug!(
                        expected = id,
                        received = response.id,
                        "rpc channel: skipping response to another request"
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(
                        error = %e,
                        raw_line = excerpt(&line),
                        "rpc channel: skipping non-protocol line"
                    );
                }
            }
        }
        Ok(None)
    }
}

/// Run `fut` under an optional deadline.
///
/// # Errors
///
/// Returns [`AppError::Timeout`] naming `stage` when the deadline elapses,
/// otherwise whatever `fut` returns.
pub async fn within<T, F>(limit: Option<Duration>, stage: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            AppError::Timeout(format!("{stage} did not complete within {limit:?}"))
        })?,
    }
}

fn excerpt(line: &str) -> &str {
    match line.char_indices().nth(LOGGED_LINE_CHARS) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
