//! Dedicated writer task owning the write half of a transport.
//!
//! Concurrent senders never touch the transport directly. They queue frames
//! over an mpsc channel and the writer task writes them one at a time, in
//! queue order, reporting each write's outcome back to its sender.
//!
//! ```text
//! send 1 ─┐
//! send 2 ─┼─► mpsc::Sender<WriterCommand> ─► Writer Task ─► FrameWrite
//! send N ─┘
//! ```
//!
//! The channel is the exclusion around the write path: a frame is either
//! written whole or not at all, and frames are never interleaved.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::transport::FrameWrite;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default time `close` waits for the writer task to close the transport.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Work item for the writer task.
#[derive(Debug)]
pub enum WriterCommand {
    /// Write one frame and report the outcome.
    Frame {
        frame: Bytes,
        written: oneshot::Sender<io::Result<()>>,
    },
    /// Close the transport and stop.
    Close { closed: oneshot::Sender<io::Result<()>> },
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable and can be shared across concurrent senders.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriterCommand>,
}

impl WriterHandle {
    /// Queue a frame and wait until it has been written.
    ///
    /// # Errors
    ///
    /// Returns the transport's write error, or `NotConnected` when the
    /// writer task has already stopped.
    pub async fn write(&self, frame: Bytes) -> io::Result<()> {
        let (written, rx) = oneshot::channel();

        if self
            .tx
            .send(WriterCommand::Frame { frame, written })
            .await
            .is_err()
        {
            return Err(not_connected());
        }

        rx.await.unwrap_or_else(|_| Err(not_connected()))
    }

    /// Ask the writer task to close the transport.
    ///
    /// Frames queued before the close are written first. Returns `Ok` if the
    /// writer task had already stopped, and `TimedOut` if queueing the close
    /// or closing the transport takes longer than `timeout`.
    pub async fn close(&self, timeout: Duration) -> io::Result<()> {
        let close = async {
            let (closed, rx) = oneshot::channel();
            if self.tx.send(WriterCommand::Close { closed }).await.is_err() {
                return Ok(());
            }
            rx.await.unwrap_or(Ok(()))
        };

        match tokio::time::timeout(timeout, close).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "timed out closing transport",
            )),
        }
    }

    /// Number of commands waiting in the queue.
    #[inline]
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Whether the writer task has stopped.
    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "writer task stopped")
}

/// Spawn the writer task and return a handle for sending frames.
///
/// # Arguments
///
/// * `writer` - The transport's write half
/// * `channel_capacity` - How many frames may wait in the queue
///
/// # Returns
///
/// A tuple of `(WriterHandle, JoinHandle)` where the JoinHandle can be used
/// to wait for the writer task to complete.
pub fn spawn_writer_task<W>(writer: W, channel_capacity: usize) -> (WriterHandle, JoinHandle<()>)
where
    W: FrameWrite,
{
    let (tx, rx) = mpsc::channel(channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer));

    (WriterHandle { tx }, task)
}

/// Main writer loop.
///
/// A failed write is reported to its sender only; later frames are still
/// attempted. The loop ends on an explicit close or when every handle is
/// dropped, closing the transport either way.
async fn writer_loop<W>(mut rx: mpsc::Receiver<WriterCommand>, mut writer: W)
where
    W: FrameWrite,
{
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Frame { frame, written } => {
                tracing::trace!(bytes = frame.len(), "Writing frame");
                let result = writer.write_frame(frame).await;
                if let Err(e) = &result {
                    tracing::warn!("Frame write failed: {}", e);
                }
                // Sender may have given up waiting.
                let _ = written.send(result);
            }
            WriterCommand::Close { closed } => {
                rx.close();
                // Fail anything still queued behind the close.
                while let Ok(command) = rx.try_recv() {
                    if let WriterCommand::Frame { written, .. } = command {
                        let _ = written.send(Err(not_connected()));
                    }
                }
                let result = writer.close().await;
                tracing::debug!("Writer closed transport");
                let _ = closed.send(result);
                return;
            }
        }
    }

    if let Err(e) = writer.close().await {
        tracing::debug!("Closing transport after last handle dropped: {}", e);
    }
}
