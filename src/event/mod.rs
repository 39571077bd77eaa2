//! Event module - server-pushed events and their handlers.
//!
//! Provides:
//! - [`Event`] - one occurrence of a pushed event
//! - [`EventHandler`] - the callback abstraction
//! - [`EventRegistry`] - maps event names to handlers
//!
//! # Example
//!
//! ```
//! use devtools_socket::event::{EventRegistry, TypedHandler};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct FrameNavigated {
//!     frame: serde_json::Value,
//! }
//!
//! let registry = EventRegistry::new();
//! registry.register(
//!     "Page.frameNavigated",
//!     TypedHandler::new(|ev: FrameNavigated| async move {
//!         println!("navigated: {}", ev.frame["url"]);
//!     }),
//! );
//! ```

mod handler;
mod registry;

pub use handler::{Event, EventHandler, FnHandler, TypedHandler};
pub use registry::EventRegistry;
