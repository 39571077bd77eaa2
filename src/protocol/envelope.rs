//! JSON envelope carried by every frame.
//!
//! Outgoing frames are always requests. Incoming frames are decoded into a
//! loose [`Envelope`] first and then classified with [`Envelope::into_frame`]:
//!
//! | `id` | `method` | frame                      |
//! |------|----------|----------------------------|
//! | yes  | no       | [`Frame::Reply`]           |
//! | no   | yes      | [`Frame::Event`]           |
//! | yes  | yes      | [`Frame::Request`]         |
//! | no   | no       | [`Frame::Unknown`]         |
//!
//! # Example
//!
//! ```
//! use devtools_socket::protocol::{Envelope, Frame};
//!
//! let envelope: Envelope = serde_json::from_str(r#"{"id":1,"result":{"y":2}}"#).unwrap();
//! match envelope.into_frame() {
//!     Frame::Reply { id, outcome } => {
//!         assert_eq!(id, 1);
//!         assert_eq!(outcome.unwrap()["y"], 2);
//!     }
//!     other => panic!("unexpected frame: {:?}", other),
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Outgoing command envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Request<'a> {
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<&'a Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
}

/// Error payload of a rejected command, as reported by the remote side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("remote error {code}: {message}")]
pub struct ResponseError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Any incoming frame before classification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ResponseError>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

/// A classified incoming frame.
#[derive(Debug, Clone)]
pub enum Frame {
    /// Answer to a command this side sent.
    Reply {
        id: u64,
        outcome: std::result::Result<Value, ResponseError>,
    },
    /// Unsolicited notification pushed by the remote side.
    Event {
        method: String,
        params: Value,
        session_id: Option<String>,
    },
    /// A command sent by the remote side. Not served by this client.
    Request { id: u64, method: String },
    /// Neither id nor method.
    Unknown,
}

impl Envelope {
    /// Classify the envelope.
    ///
    /// A reply carrying an `error` is a failure even if a `result` is also
    /// present. A reply with neither resolves to `Value::Null`.
    pub fn into_frame(self) -> Frame {
        match (self.id, self.method) {
            (Some(id), None) => {
                let outcome = match self.error {
                    Some(error) => Err(error),
                    None => Ok(self.result.unwrap_or(Value::Null)),
                };
                Frame::Reply { id, outcome }
            }
            (None, Some(method)) => Frame::Event {
                method,
                params: self.params.unwrap_or(Value::Null),
                session_id: self.session_id,
            },
            (Some(id), Some(method)) => Frame::Request { id, method },
            (None, None) => Frame::Unknown,
        }
    }
}
