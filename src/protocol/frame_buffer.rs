//! Frame buffer for NUL-delimited message streams.
//!
//! The pipe transport of the DevTools protocol carries one JSON message per
//! frame, each terminated by a single `\0` byte. Reads from the pipe do not
//! respect message boundaries, so incoming bytes are accumulated here and
//! complete messages are split off as they become available.
//!
//! Uses `bytes::BytesMut` so extracted messages are zero-copy `Bytes`.
//!
//! # Example
//!
//! ```
//! use devtools_socket::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! assert!(buffer.push(b"{\"id\":1,").unwrap().is_empty());
//! let frames = buffer.push(b"\"result\":{}}\0{\"id\":2}\0").unwrap();
//!
//! assert_eq!(frames.len(), 2);
//! assert_eq!(&frames[1][..], b"{\"id\":2}");
//! ```

use std::io;

use bytes::{Bytes, BytesMut};

/// Message terminator.
pub const FRAME_DELIMITER: u8 = 0;

/// Default maximum message size (256 MiB).
///
/// Heap snapshots and screenshots routinely exceed tens of megabytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// Buffer for accumulating incoming bytes and extracting complete messages.
pub struct FrameBuffer {
    /// Accumulated bytes not yet terminated.
    buffer: BytesMut,
    /// How far `buffer` has already been scanned for a delimiter.
    scanned: usize,
    /// Maximum allowed message size.
    max_message_size: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max message: 256MiB.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a new frame buffer with a custom message size limit.
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            scanned: 0,
            max_message_size,
        }
    }

    /// Push data into the buffer and extract all complete messages.
    ///
    /// Partial trailing data is kept for the next push. Empty messages
    /// (two consecutive delimiters) are skipped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if a message exceeds the size limit. The buffer
    /// is unusable afterwards.
    pub fn push(&mut self, data: &[u8]) -> io::Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            if !frame.is_empty() {
                frames.push(frame);
            }
        }

        Ok(frames)
    }

    /// Try to extract a single message.
    fn try_extract_one(&mut self) -> io::Result<Option<Bytes>> {
        let unscanned = &self.buffer[self.scanned..];
        match unscanned.iter().position(|&b| b == FRAME_DELIMITER) {
            Some(offset) => {
                let end = self.scanned + offset;
                self.check_size(end)?;

                let frame = self.buffer.split_to(end).freeze();
                // Drop the delimiter itself.
                let _ = self.buffer.split_to(1);
                self.scanned = 0;
                Ok(Some(frame))
            }
            None => {
                self.scanned = self.buffer.len();
                self.check_size(self.buffer.len())?;
                Ok(None)
            }
        }
    }

    fn check_size(&self, len: usize) -> io::Result<()> {
        if len > self.max_message_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "message size {} exceeds maximum {}",
                    len, self.max_message_size
                ),
            ));
        }
        Ok(())
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
