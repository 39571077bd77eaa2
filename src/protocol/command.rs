//! Caller-owned command record.
//!
//! A [`Command`] is built by the caller without an id and handed to
//! [`Dispatcher::send_command`](crate::Dispatcher::send_command), which
//! assigns the id and fills in exactly one of `result` or `error`.
//!
//! # Example
//!
//! ```
//! use devtools_socket::protocol::Command;
//! use serde_json::json;
//!
//! let cmd = Command::new("Runtime.evaluate").with_params(json!({"expression": "1+1"}));
//! assert_eq!(cmd.method, "Runtime.evaluate");
//! assert!(!cmd.is_complete());
//! ```

use serde_json::Value;

use super::Request;
use crate::error::{Result, SocketError};

/// A single request and, once completed, its outcome.
#[derive(Debug, Clone, Default)]
pub struct Command {
    /// Assigned by the dispatcher; 0 until sent.
    pub id: u64,
    /// Method name, e.g. `"Profiler.enable"`.
    pub method: String,
    /// Optional parameters.
    pub params: Option<Value>,
    /// Target session for flattened multi-target connections.
    pub session_id: Option<String>,
    /// Set on success.
    pub result: Option<Value>,
    /// Set on failure.
    pub error: Option<SocketError>,
}

impl Command {
    /// Create a command without parameters.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Self::default()
        }
    }

    /// Attach parameters.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Address the command to a specific session.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Whether the dispatcher has completed this command.
    pub fn is_complete(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }

    /// Wire envelope for this command under the given id.
    pub(crate) fn request(&self, id: u64) -> Request<'_> {
        Request {
            id,
            method: &self.method,
            params: self.params.as_ref(),
            session_id: self.session_id.as_deref(),
        }
    }

    /// Forget a previous send so the command can go out again.
    pub(crate) fn reset(&mut self) {
        self.id = 0;
        self.result = None;
        self.error = None;
    }

    /// Record the outcome. Later calls are ignored.
    pub(crate) fn complete(&mut self, outcome: Result<Value>) {
        if self.is_complete() {
            return;
        }
        match outcome {
            Ok(value) => self.result = Some(value),
            Err(err) => self.error = Some(err),
        }
    }

    /// Convert the completed command into a plain result.
    ///
    /// An incomplete command yields `Ok(Value::Null)`.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}
