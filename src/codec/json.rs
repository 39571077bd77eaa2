//! JSON codec using `serde_json`.
//!
//! Every frame on a DevTools connection is a single UTF-8 JSON object.
//! Encoding produces compact output (no whitespace, no trailing newline) so
//! the result can be written as one WebSocket text message or one
//! NUL-terminated pipe message.
//!
//! # Example
//!
//! ```
//! use devtools_socket::codec::JsonCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Message {
//!     id: u32,
//!     content: String,
//! }
//!
//! let msg = Message { id: 42, content: "hello".to_string() };
//! let encoded = JsonCodec::encode(&msg).unwrap();
//! let decoded: Message = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use bytes::Bytes;

/// JSON codec for frame payloads.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to compact JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized (e.g. a map with
    /// non-string keys).
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> serde_json::Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    /// Decode JSON bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not valid JSON for type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> serde_json::Result<T> {
        serde_json::from_slice(bytes)
    }

    /// Convert an already decoded JSON value into a typed value.
    #[inline]
    pub fn from_value<T: serde::de::DeserializeOwned>(
        value: serde_json::Value,
    ) -> serde_json::Result<T> {
        serde_json::from_value(value)
    }
}
