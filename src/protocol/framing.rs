//! Wire protocol codec for var_send debug dumps.
//!
//! Each dump travels as a single length-prefixed frame:
//!
//! ```text
//! [u32 BE length L] [L bytes: UTF-8 text body]
//! ```
//!
//! `L` must be in `1..=max_body_size` (10 MiB unless configured otherwise).
//! Nothing is ever written back to the peer; a bad frame just closes the
//! connection.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, Local};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::constants::{
    DEFAULT_READ_TIMEOUT, INITIAL_BODY_CAPACITY, LENGTH_PREFIX_SIZE, MAX_BODY_SIZE,
    READ_CHUNK_SIZE,
};

/// Errors produced while reading a frame from a connection.
///
/// All of these are scoped to a single connection and never fatal to the
/// listener.
#[derive(Debug)]
pub enum FramingError {
    /// Stream ended before the 4-byte length prefix was complete.
    Truncated,
    /// Declared length is zero or above the configured cap.
    InvalidLength {
        /// The declared body length.
        value: u32,
    },
    /// Stream ended part-way through the body.
    Incomplete {
        /// Declared body length.
        expected: u32,
        /// Bytes received before the stream closed.
        got: usize,
    },
    /// Peer made no progress within the configured read window.
    Timeout,
    /// Transport failure other than end-of-stream (reset, aborted, ...).
    Io(io::Error),
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "Stream ended before length prefix was complete"),
            Self::InvalidLength { value } => write!(f, "Invalid message length: {value}"),
            Self::Incomplete { expected, got } => {
                write!(f, "Incomplete message: got {got}, expected {expected}")
            }
            Self::Timeout => write!(f, "Read timed out"),
            Self::Io(e) => write!(f, "Connection error: {e}"),
        }
    }
}

impl std::error::Error for FramingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Bounds applied by [`FrameReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Largest accepted body length in bytes.
    pub max_body_size: u32,
    /// Window for each underlying read; `None` waits forever.
    pub read_timeout: Option<Duration>,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_body_size: MAX_BODY_SIZE,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
        }
    }
}

/// A fully reassembled, not yet parsed, dump.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Body decoded as UTF-8 (invalid sequences replaced with U+FFFD).
    pub text: String,
    /// Address and port of the sending peer.
    pub peer: SocketAddr,
    /// Body size in bytes as declared on the wire.
    pub size_bytes: usize,
    /// When the body finished arriving.
    pub received_at: DateTime<Local>,
}

impl RawFrame {
    /// Build a frame from an assembled body, stamping the arrival time.
    pub fn new(body: &[u8], peer: SocketAddr) -> Self {
        Self {
            text: decode_body(body),
            peer,
            size_bytes: body.len(),
            received_at: Local::now(),
        }
    }
}

/// Lossy UTF-8 decode; debug payloads with encoding noise are kept, not dropped.
pub fn decode_body(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

/// Encode a body into wire format: `[u32 BE length][body]`.
///
/// # Errors
///
/// Returns an error if the body is empty or longer than `u32::MAX` bytes.
pub fn encode_frame(body: &[u8]) -> Result<Vec<u8>> {
    if body.is_empty() {
        bail!("Cannot frame an empty body");
    }
    let Ok(length) = u32::try_from(body.len()) else {
        bail!("Body too large to frame: {} bytes", body.len());
    };
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    buf.extend_from_slice(&length.to_be_bytes());
    buf.extend_from_slice(body);
    Ok(buf)
}

/// Reads length-prefixed frames from an async byte stream.
///
/// Handles arbitrarily small partial reads: the prefix and the body are
/// both accumulated across as many underlying reads as the transport needs.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    limits: FrameLimits,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a reader with the given limits.
    pub fn new(reader: R, limits: FrameLimits) -> Self {
        Self { reader, limits }
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read exactly one frame.
    ///
    /// A stream that closes before any byte arrives is reported as
    /// [`FramingError::Truncated`], since the one-shot protocol expects a frame.
    pub async fn read_frame(&mut self) -> Result<Vec<u8>, FramingError> {
        self.next_frame().await?.ok_or(FramingError::Truncated)
    }

    /// Read the next frame, or `Ok(None)` if the stream closed cleanly on a
    /// frame boundary.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FramingError> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        let mut filled = 0;
        while filled < LENGTH_PREFIX_SIZE {
            let n = self.read_some(&mut prefix[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(FramingError::Truncated);
            }
            filled += n;
        }

        let declared = u32::from_be_bytes(prefix);
        if declared == 0 || declared > self.limits.max_body_size {
            return Err(FramingError::InvalidLength { value: declared });
        }

        let expected = declared as usize;
        let mut body = Vec::with_capacity(expected.min(INITIAL_BODY_CAPACITY));
        let mut chunk = vec![0u8; expected.min(READ_CHUNK_SIZE)];
        while body.len() < expected {
            let want = (expected - body.len()).min(chunk.len());
            let n = self.read_some(&mut chunk[..want]).await?;
            if n == 0 {
                return Err(FramingError::Incomplete {
                    expected: declared,
                    got: body.len(),
                });
            }
            body.extend_from_slice(&chunk[..n]);
        }

        Ok(Some(body))
    }

    /// One underlying read, bounded by the configured timeout.
    async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, FramingError> {
        let window = self.limits.read_timeout;
        let read = self.reader.read(buf);
        let result = match window {
            Some(window) => match tokio::time::timeout(window, read).await {
                Ok(result) => result,
                Err(_elapsed) => return Err(FramingError::Timeout),
            },
            None => read.await,
        };
        result.map_err(FramingError::Io)
    }
}
