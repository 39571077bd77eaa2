//! Transport module - the framed duplex connection under a dispatcher.
//!
//! A transport is split once, at dispatcher start, into a read half owned by
//! the receive loop and a write half owned by the writer task:
//!
//! - [`FrameRead`] - yields one complete frame per call
//! - [`FrameWrite`] - writes one complete frame per call, closes the connection
//! - [`Transport`] - anything that can be split into the two halves
//!
//! Provided implementations:
//! - [`PipeTransport`] - NUL-delimited frames over any byte stream
//! - [`WebSocketTransport`] - one frame per WebSocket message

mod pipe;
mod websocket;

use std::io;

use bytes::Bytes;

pub use crate::BoxFuture;
pub use pipe::{PipeReader, PipeTransport, PipeWriter};
pub use websocket::{WebSocketReader, WebSocketTransport, WebSocketWriter};

/// Read half of a framed connection.
pub trait FrameRead: Send + 'static {
    /// Read the next complete frame.
    ///
    /// Returns `Ok(None)` when the remote side closed the connection cleanly.
    fn read_frame(&mut self) -> BoxFuture<'_, io::Result<Option<Bytes>>>;
}

/// Write half of a framed connection.
pub trait FrameWrite: Send + 'static {
    /// Write one complete frame and flush it.
    fn write_frame(&mut self, frame: Bytes) -> BoxFuture<'_, io::Result<()>>;

    /// Close the connection. Called at most once.
    fn close(&mut self) -> BoxFuture<'_, io::Result<()>>;
}

/// A framed duplex connection.
pub trait Transport: Send + 'static {
    type Reader: FrameRead;
    type Writer: FrameWrite;

    /// Split into read and write halves.
    fn into_split(self) -> (Self::Reader, Self::Writer);
}

impl<R: FrameRead, W: FrameWrite> Transport for (R, W) {
    type Reader = R;
    type Writer = W;

    fn into_split(self) -> (R, W) {
        self
    }
}
