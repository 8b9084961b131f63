//! Line transport over byte streams.
//!
//! [`FrameReader`] turns any `AsyncRead` into a stream of decoded frames and
//! [`LineWriter`] writes whole encoded lines to any `AsyncWrite`. Both the
//! gateway's own stdio and each participant's child stdio use these types.
//!
//! Framing is delegated to [`LinesCodec`], so a line split across read
//! chunks is carried forward until its newline arrives.

use super::codec::{self, CodecError, ParseError};
use super::envelope::Envelope;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::trace;

/// Default upper bound for one line (16 MiB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Transport-level failures
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Line exceeds {max} bytes")]
    LineTooLong { max: usize },

    #[error("Transport closed")]
    TransportClosed,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e.to_string())
    }
}

/// One decoded inbound line
#[derive(Debug, Clone)]
pub enum Inbound {
    Envelope(Envelope),
    /// The line was read but could not be decoded; the stream continues
    Malformed(ParseError),
}

/// Read side of a line transport
pub struct FrameReader {
    frames: FramedRead<BoxedReader, LinesCodec>,
    max_line_bytes: usize,
}

impl FrameReader {
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::with_max_line_bytes(reader, DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_line_bytes<R>(reader: R, max_line_bytes: usize) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let reader: BoxedReader = Box::new(reader);
        Self {
            frames: FramedRead::new(reader, LinesCodec::new_with_max_length(max_line_bytes)),
            max_line_bytes,
        }
    }

    /// Next frame from the stream.
    ///
    /// - `Ok(Some(_))`: a decoded envelope or a malformed line
    /// - `Ok(None)`: the stream closed
    /// - `Err(_)`: I/O failure or over-long line; the stream is unusable afterwards
    ///
    /// Blank lines are skipped.
    pub async fn next_frame(&mut self) -> Result<Option<Inbound>, TransportError> {
        loop {
            match self.frames.next().await {
                None => return Ok(None),
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    trace!("Received: {}", line);
                    return Ok(Some(match codec::decode(&line) {
                        Ok(envelope) => Inbound::Envelope(envelope),
                        Err(e) => Inbound::Malformed(e),
                    }));
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    return Err(TransportError::LineTooLong {
                        max: self.max_line_bytes,
                    });
                }
                Some(Err(LinesCodecError::Io(e))) => return Err(e.into()),
            }
        }
    }
}

/// Write side of a line transport
///
/// Writes are serialized by a lock so concurrent senders never interleave
/// partial lines. A write that is cut off or fails part-way leaves the
/// stream mid-line, so the writer refuses every later send.
pub struct LineWriter {
    writer: Mutex<Option<BufWriter<BoxedWriter>>>,
    closed: AtomicBool,
}

/// Marks the writer closed unless the guarded write completes
struct UnfinishedWrite<'a> {
    closed: &'a AtomicBool,
    done: bool,
}

impl Drop for UnfinishedWrite<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.closed.store(true, Ordering::SeqCst);
        }
    }
}

impl LineWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: BoxedWriter = Box::new(writer);
        Self {
            writer: Mutex::new(Some(BufWriter::new(writer))),
            closed: AtomicBool::new(false),
        }
    }

    /// Encode and write one envelope followed by a newline.
    ///
    /// Fails with [`TransportError::TransportClosed`] without touching the
    /// stream once the writer is closed. Dropping the returned future while
    /// the line is being written closes the writer.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::TransportClosed);
        }

        let mut line = codec::encode(envelope)?;
        line.push('\n');

        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(TransportError::TransportClosed);
        };
        if self.is_closed() {
            return Err(TransportError::TransportClosed);
        }

        trace!("Sending: {}", line.trim_end());
        let mut unfinished = UnfinishedWrite {
            closed: &self.closed,
            done: false,
        };
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        unfinished.done = true;
        Ok(())
    }

    /// Refuse further sends without waiting for a write in progress
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Refuse further sends, then flush and shut down the underlying
    /// stream. Idempotent.
    ///
    /// Waits for a write in progress to release the stream.
    pub async fn close(&self) {
        self.mark_closed();
        let mut guard = self.writer.lock().await;
        if let Some(mut writer) = guard.take() {
            let _ = writer.flush().await;
            let _ = writer.shutdown().await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
