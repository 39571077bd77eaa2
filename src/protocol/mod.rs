//! Protocol module - wire envelope, framing, and command records.
//!
//! This module implements the data carried over a connection:
//! - JSON envelope and its classification into reply/event/request
//! - Caller-owned [`Command`] records
//! - Frame buffer for NUL-delimited pipe streams

mod command;
mod envelope;
mod frame_buffer;

pub use command::Command;
pub use envelope::{Envelope, Frame, Request, ResponseError};
pub use frame_buffer::{FrameBuffer, DEFAULT_MAX_MESSAGE_SIZE, FRAME_DELIMITER};
