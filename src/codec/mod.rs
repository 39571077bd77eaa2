//! Codec module - serialization/deserialization for frames.
//!
//! - [`JsonCodec`] - compact JSON using `serde_json`
//!
//! # Design
//!
//! Codecs are implemented as marker structs with static methods rather than
//! trait objects, so the codec is fixed at compile time.
//!
//! # Example
//!
//! ```
//! use devtools_socket::codec::JsonCodec;
//!
//! let encoded = JsonCodec::encode(&"hello").unwrap();
//! let decoded: String = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod json;

pub use json::JsonCodec;
