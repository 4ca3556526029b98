//! Line framing for the helper's stdin and stdout.
//!
//! One JSON-RPC message per `\n`-terminated UTF-8 line. Inbound lines are
//! capped at [`MAX_LINE_BYTES`]; a helper that prints an unterminated blob
//! is cut off there instead of growing the read buffer.

use std::io::ErrorKind;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::{AppError, Result};

/// Longest accepted stdout line: 8 MiB.
pub const MAX_LINE_BYTES: usize = 8 * 1_048_576;

/// [`LinesCodec`] that drops unreadable lines instead of failing.
///
/// An over-long line (discarded up to its newline) or a line that is not
/// UTF-8 is logged at `warn` and skipped; decoding carries on with the next
/// line in the buffer. Only I/O failures surface, as [`AppError::Io`].
#[derive(Debug)]
pub struct RpcCodec(LinesCodec);

impl RpcCodec {
    /// Codec limited to [`MAX_LINE_BYTES`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Codec limited to `max_length` bytes per inbound line.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max_length))
    }
}

impl Default for RpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RpcCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        loop {
            match self.0.decode(src) {
                Ok(line) => return Ok(line),
                Err(err) => skip_unreadable(err)?,
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        loop {
            match self.0.decode_eof(src) {
                Ok(line) => return Ok(line),
                Err(err) => skip_unreadable(err)?,
            }
        }
    }
}

impl Encoder<String> for RpcCodec {
    type Error = AppError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<()> {
        self.0
            .encode(line, dst)
            .map_err(|err| AppError::Io(err.to_string()))
    }
}

/// `Ok` for errors that only spoil the line just consumed.
fn skip_unreadable(err: LinesCodecError) -> Result<()> {
    match err {
        LinesCodecError::MaxLineLengthExceeded => {
            warn!("rpc codec: line too long, skipping");
            Ok(())
        }
        LinesCodecError::Io(io) if io.kind() == ErrorKind::InvalidData => {
            warn!(error = %io, "rpc codec: line is not valid utf-8, skipping");
            Ok(())
        }
        LinesCodecError::Io(io) => Err(AppError::Io(io.to_string())),
    }
}
