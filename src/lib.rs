//! # devtools-socket
//!
//! Command/response and event dispatch over a remote-debugging connection
//! (Chrome DevTools Protocol and compatible endpoints).
//!
//! Many tasks can send commands over one connection at the same time. Each
//! command gets a fresh integer id; a single receive loop routes each reply
//! back to the caller waiting on that id and fans server-pushed events out
//! to the handlers registered for their name.
//!
//! ## Architecture
//!
//! - **Transport**: WebSocket (`ws://`) or NUL-delimited pipe
//!   (`--remote-debugging-pipe`), split into read and write halves
//! - **Writer task**: owns the write half; frames are written whole, one at a time
//! - **Receive loop**: owns the read half; resolves replies and spawns event handlers
//!
//! ## Example
//!
//! ```ignore
//! use devtools_socket::transport::WebSocketTransport;
//! use devtools_socket::Dispatcher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = WebSocketTransport::connect("ws://127.0.0.1:9222/devtools/browser/XYZ").await?;
//!     let dispatcher = Dispatcher::start(transport);
//!
//!     let version = dispatcher.send("Browser.getVersion", None).await?;
//!     println!("{}", version["product"]);
//!
//!     dispatcher.close().await;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod codec;
pub mod error;
pub mod event;
pub mod protocol;
pub mod transport;

mod dispatcher;
mod pending;
mod writer;

pub use dispatcher::{
    Dispatcher, DispatcherBuilder, DispatcherConfig, DEFAULT_MAX_CONCURRENT_HANDLERS,
};
pub use error::{Result, SocketError};
pub use event::Event;
pub use protocol::{Command, ResponseError};
pub use writer::DEFAULT_CHANNEL_CAPACITY;

/// Boxed future used at the object-safe seams (transports, event handlers).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
