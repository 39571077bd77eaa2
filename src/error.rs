//! Error types for devtools-socket.
//!
//! Every failure that crosses the connection boundary is a [`SocketError`].
//! Each variant records where it was raised (via `#[track_caller]`), a
//! human readable message and, when there is one, the underlying cause.
//!
//! The kind tells the caller what happened to the connection:
//!
//! - [`SocketError::ReadFailed`] - the receive loop died, the connection is gone
//! - [`SocketError::WriteFailed`] - this one command never reached the remote
//! - [`SocketError::ErrorResponse`] - the remote rejected this one command
//! - [`SocketError::Timeout`] - the caller stopped waiting for a reply

use std::error::Error as StdError;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use thiserror::Error;

use crate::protocol::ResponseError;

/// Shared, type-erased failure cause.
///
/// Shared so that a single read failure can be handed to every waiting caller.
pub type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// Source location of the code that raised an error.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Caller(&'static Location<'static>);

impl Caller {
    /// Capture the location of the caller.
    #[track_caller]
    #[inline]
    pub fn capture() -> Self {
        Self(Location::caller())
    }

    /// File name of the call site.
    pub fn file(&self) -> &'static str {
        self.0.file()
    }

    /// Line number of the call site.
    pub fn line(&self) -> u32 {
        self.0.line()
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.0.file(), self.0.line(), self.0.column())
    }
}

impl fmt::Debug for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Renders `"; {cause}"` when a cause is present.
struct CauseSuffix<'a>(&'a Option<Cause>);

impl fmt::Display for CauseSuffix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(cause) => write!(f, "; {}", cause),
            None => Ok(()),
        }
    }
}

/// Main error type for all dispatcher operations.
#[derive(Debug, Clone, Error)]
pub enum SocketError {
    /// The receive loop could not read or decode the next frame.
    ///
    /// The connection is presumed dead; the dispatcher has to be rebuilt.
    #[error("{caller} - {message}{}", CauseSuffix(.source))]
    ReadFailed {
        caller: Caller,
        message: String,
        #[source]
        source: Option<Cause>,
    },

    /// Serializing or writing a command failed.
    ///
    /// The command did not reach the remote side (or its delivery is unknown)
    /// and must be treated as not applied.
    #[error("{caller} - {message}{}", CauseSuffix(.source))]
    WriteFailed {
        caller: Caller,
        message: String,
        #[source]
        source: Option<Cause>,
    },

    /// The remote side answered a command with an error payload.
    ///
    /// Only this command failed; the connection is still usable.
    #[error("{caller} - {message}; {source}")]
    ErrorResponse {
        caller: Caller,
        message: String,
        #[source]
        source: ResponseError,
    },

    /// No reply arrived within the allowed time.
    #[error("{caller} - {message}")]
    Timeout { caller: Caller, message: String },
}

impl SocketError {
    /// Build a [`SocketError::ReadFailed`] located at the caller.
    #[track_caller]
    pub fn read_failed<E>(message: impl Into<String>, cause: Option<E>) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        SocketError::ReadFailed {
            caller: Caller::capture(),
            message: message.into(),
            source: cause.map(|e| Arc::new(e) as Cause),
        }
    }

    /// Build a [`SocketError::WriteFailed`] located at the caller.
    #[track_caller]
    pub fn write_failed<E>(message: impl Into<String>, cause: Option<E>) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        SocketError::WriteFailed {
            caller: Caller::capture(),
            message: message.into(),
            source: cause.map(|e| Arc::new(e) as Cause),
        }
    }

    /// Build a [`SocketError::ErrorResponse`] located at the caller.
    #[track_caller]
    pub fn error_response(message: impl Into<String>, response: ResponseError) -> Self {
        SocketError::ErrorResponse {
            caller: Caller::capture(),
            message: message.into(),
            source: response,
        }
    }

    /// Build a [`SocketError::Timeout`] located at the caller.
    #[track_caller]
    pub fn timeout(message: impl Into<String>) -> Self {
        SocketError::Timeout {
            caller: Caller::capture(),
            message: message.into(),
        }
    }

    /// Where the error was raised.
    pub fn caller(&self) -> Caller {
        match self {
            SocketError::ReadFailed { caller, .. }
            | SocketError::WriteFailed { caller, .. }
            | SocketError::ErrorResponse { caller, .. }
            | SocketError::Timeout { caller, .. } => *caller,
        }
    }

    /// The message attached at the raise site.
    pub fn message(&self) -> &str {
        match self {
            SocketError::ReadFailed { message, .. }
            | SocketError::WriteFailed { message, .. }
            | SocketError::ErrorResponse { message, .. }
            | SocketError::Timeout { message, .. } => message,
        }
    }

    /// The remote error payload, for [`SocketError::ErrorResponse`].
    pub fn response(&self) -> Option<&ResponseError> {
        match self {
            SocketError::ErrorResponse { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether the connection is gone and the dispatcher must be rebuilt.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, SocketError::ReadFailed { .. })
    }
}

/// Result type alias using SocketError.
pub type Result<T> = std::result::Result<T, SocketError>;
