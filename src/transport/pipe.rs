//! NUL-delimited frames over a byte stream.
//!
//! This is the framing Chromium uses with `--remote-debugging-pipe`: the
//! browser reads commands from fd 3 and writes replies and events to fd 4,
//! each message terminated by `\0`. The same framing works over any
//! `AsyncRead`/`AsyncWrite` pair, which makes it the transport of choice for
//! in-memory tests with `tokio::io::duplex`.
//!
//! # Example
//!
//! ```ignore
//! use devtools_socket::transport::PipeTransport;
//! use devtools_socket::Dispatcher;
//!
//! let (ours, theirs) = tokio::io::duplex(64 * 1024);
//! let dispatcher = Dispatcher::start(PipeTransport::new(ours));
//! ```

use std::collections::VecDeque;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use super::{BoxFuture, FrameRead, FrameWrite, Transport};
use crate::protocol::{FrameBuffer, DEFAULT_MAX_MESSAGE_SIZE, FRAME_DELIMITER};

/// Size of a single read from the underlying stream.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Pipe transport built from a read stream and a write stream.
pub struct PipeTransport<R, W> {
    reader: R,
    writer: W,
    max_message_size: usize,
}

impl<S> PipeTransport<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap a single bidirectional stream.
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_halves(reader, writer)
    }
}

impl<R, W> PipeTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap separate read and write streams (e.g. a child's stdout and stdin).
    pub fn from_halves(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Set the maximum size of a single incoming message.
    ///
    /// Default: 256 MiB
    pub fn max_message_size(mut self, limit: usize) -> Self {
        self.max_message_size = limit;
        self
    }
}

impl<R, W> Transport for PipeTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Reader = PipeReader<R>;
    type Writer = PipeWriter<W>;

    fn into_split(self) -> (PipeReader<R>, PipeWriter<W>) {
        let reader = PipeReader {
            inner: self.reader,
            buffer: FrameBuffer::with_max_message_size(self.max_message_size),
            ready: VecDeque::new(),
            chunk: vec![0u8; READ_CHUNK_SIZE],
        };
        let writer = PipeWriter { inner: self.writer };
        (reader, writer)
    }
}

/// Read half of a [`PipeTransport`].
pub struct PipeReader<R> {
    inner: R,
    buffer: FrameBuffer,
    /// Messages already split off but not yet handed out.
    ready: VecDeque<Bytes>,
    chunk: Vec<u8>,
}

impl<R> FrameRead for PipeReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    fn read_frame(&mut self) -> BoxFuture<'_, std::io::Result<Option<Bytes>>> {
        Box::pin(async move {
            loop {
                if let Some(frame) = self.ready.pop_front() {
                    return Ok(Some(frame));
                }

                let n = self.inner.read(&mut self.chunk).await?;
                if n == 0 {
                    if !self.buffer.is_empty() {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            format!(
                                "pipe closed with {} bytes of an unterminated message",
                                self.buffer.len()
                            ),
                        ));
                    }
                    return Ok(None);
                }

                let frames = self.buffer.push(&self.chunk[..n])?;
                self.ready.extend(frames);
            }
        })
    }
}

/// Write half of a [`PipeTransport`].
pub struct PipeWriter<W> {
    inner: W,
}

impl<W> FrameWrite for PipeWriter<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn write_frame(&mut self, frame: Bytes) -> BoxFuture<'_, std::io::Result<()>> {
        Box::pin(async move {
            self.inner.write_all(&frame).await?;
            self.inner.write_all(&[FRAME_DELIMITER]).await?;
            self.inner.flush().await
        })
    }

    fn close(&mut self) -> BoxFuture<'_, std::io::Result<()>> {
        Box::pin(async move { self.inner.shutdown().await })
    }
}
