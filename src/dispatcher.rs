//! Command dispatcher: builder, send path and receive loop.
//!
//! The [`DispatcherBuilder`] provides a fluent API for configuration and
//! event handlers. [`DispatcherBuilder::start`] splits the transport and
//! spawns two tasks:
//! 1. the writer task, owning the write half
//! 2. the receive loop, owning the read half
//!
//! Callers then use the cheaply cloneable [`Dispatcher`] handle from any
//! number of tasks.
//!
//! # Example
//!
//! ```ignore
//! use devtools_socket::transport::WebSocketTransport;
//! use devtools_socket::{Dispatcher, Event};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = WebSocketTransport::connect("ws://127.0.0.1:9222/devtools/page/ABC").await?;
//!     let dispatcher = Dispatcher::builder()
//!         .event("Page.loadEventFired", |event: Event| async move {
//!             println!("loaded at {}", event.params["timestamp"]);
//!         })
//!         .start(transport);
//!
//!     dispatcher.send("Page.enable", None).await?;
//!     dispatcher
//!         .send("Page.navigate", Some(json!({"url": "https://example.com"})))
//!         .await?;
//!
//!     dispatcher.close().await;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{oneshot, watch, Semaphore};
use tokio::task::JoinHandle;

use crate::codec::JsonCodec;
use crate::error::{Result, SocketError};
use crate::event::{Event, EventHandler, EventRegistry, FnHandler, TypedHandler};
use crate::pending::PendingTable;
use crate::protocol::{Command, Envelope, Frame};
use crate::transport::{FrameRead, Transport};
use crate::writer::{
    spawn_writer_task, WriterHandle, DEFAULT_CHANNEL_CAPACITY, DEFAULT_CLOSE_TIMEOUT,
};

/// Default maximum concurrently running event handler invocations.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Give up waiting for a reply after this long. `None` waits until the
    /// reply arrives or the connection dies.
    pub command_timeout: Option<Duration>,
    /// Event handler invocations allowed to run at the same time.
    pub max_concurrent_handlers: usize,
    /// Outgoing frames that may queue for the writer task.
    pub channel_capacity: usize,
    /// How long `close` waits for the transport to close before abandoning
    /// the write half.
    pub close_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            command_timeout: None,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

/// Builder for configuring and starting a [`Dispatcher`].
pub struct DispatcherBuilder {
    registry: EventRegistry,
    config: DispatcherConfig,
}

impl DispatcherBuilder {
    /// Create a new dispatcher builder.
    pub fn new() -> Self {
        Self {
            registry: EventRegistry::new(),
            config: DispatcherConfig::default(),
        }
    }

    /// Register an event handler before the connection starts, so no early
    /// event can be missed.
    pub fn event<F, Fut>(self, method: &str, handler: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.registry.register(method, FnHandler::new(handler));
        self
    }

    /// Register a handler receiving the event params deserialized into `T`.
    pub fn on<F, T, Fut>(self, method: &str, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.registry.register(method, TypedHandler::new(handler));
        self
    }

    /// Fail commands whose reply takes longer than `timeout`.
    ///
    /// Default: no timeout
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of concurrently running event handlers.
    ///
    /// Further invocations wait for a slot; the receive loop never does.
    /// Default: 256
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.config.max_concurrent_handlers = limit;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set how long `close` waits for the transport to close.
    ///
    /// Default: 5 seconds
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Take ownership of the transport and start the dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<T: Transport>(self, transport: T) -> Dispatcher {
        Dispatcher::start_with(transport, self.registry, self.config)
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared between dispatcher handles and the receive loop.
struct Shared {
    pending: PendingTable,
    registry: EventRegistry,
    handler_semaphore: Arc<Semaphore>,
}

struct Inner {
    shared: Arc<Shared>,
    writer: WriterHandle,
    config: DispatcherConfig,
    /// Set once `close` has been requested.
    closing: AtomicBool,
    /// Tells the receive loop to stop. Dropping it does too.
    shutdown_tx: watch::Sender<bool>,
    /// Flips to `true` once teardown has finished.
    closed_rx: watch::Receiver<bool>,
    _receive_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

/// Handle to a running dispatcher.
///
/// Cloning is cheap; all clones share one connection. The connection is
/// torn down on [`close`](Dispatcher::close), when the remote side goes
/// away, or when the last handle is dropped.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Create a new dispatcher builder.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Start a dispatcher with default configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<T: Transport>(transport: T) -> Self {
        DispatcherBuilder::new().start(transport)
    }

    fn start_with<T: Transport>(
        transport: T,
        registry: EventRegistry,
        config: DispatcherConfig,
    ) -> Self {
        let (reader, writer) = transport.into_split();

        let (writer, writer_task) = spawn_writer_task(writer, config.channel_capacity);

        let shared = Arc::new(Shared {
            pending: PendingTable::new(),
            registry,
            handler_semaphore: Arc::new(Semaphore::new(config.max_concurrent_handlers.max(1))),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (closed_tx, closed_rx) = watch::channel(false);

        let receive_task = tokio::spawn(receive_loop(
            reader,
            shared.clone(),
            shutdown_rx,
            closed_tx,
        ));

        tracing::debug!("Dispatcher started");

        Dispatcher {
            inner: Arc::new(Inner {
                shared,
                writer,
                config,
                closing: AtomicBool::new(false),
                shutdown_tx,
                closed_rx,
                _receive_task: receive_task,
                writer_task,
            }),
        }
    }

    /// Send a command and wait for its result.
    ///
    /// # Errors
    ///
    /// - [`SocketError::WriteFailed`] if the command could not be written
    /// - [`SocketError::ErrorResponse`] if the remote side rejected it
    /// - [`SocketError::ReadFailed`] if the connection died before the reply
    /// - [`SocketError::Timeout`] if a command timeout is configured and expired
    pub async fn send(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let mut command = Command::new(method);
        command.params = params;
        self.send_command(&mut command).await;
        command.into_result()
    }

    /// Send a command, waiting at most `timeout` for the reply.
    ///
    /// Overrides the configured command timeout.
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let mut command = Command::new(method);
        command.params = params;
        let outcome = self.execute_with_timeout(&mut command, timeout).await;
        command.complete(outcome);
        command.into_result()
    }

    /// Send a caller-owned command and complete it in place.
    ///
    /// On return `command.id` holds the assigned id (0 if none could be
    /// assigned) and exactly one of `command.result` / `command.error` is set.
    /// A command that was already completed is sent again as a new request.
    pub async fn send_command(&self, command: &mut Command) {
        command.reset();
        let outcome = match self.inner.config.command_timeout {
            Some(timeout) => self.execute_with_timeout(command, timeout).await,
            None => self.execute(command).await,
        };
        command.complete(outcome);
    }

    async fn execute_with_timeout(&self, command: &mut Command, timeout: Duration) -> Result<Value> {
        let outcome = tokio::time::timeout(timeout, self.execute(command)).await;
        match outcome {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(id = command.id, method = %command.method, "Command timed out");
                Err(SocketError::timeout(format!(
                    "{} (id {}) got no reply within {:?}",
                    command.method, command.id, timeout
                )))
            }
        }
    }

    /// Register, write, and wait for one command.
    ///
    /// Dropping the returned future at any point removes the pending entry.
    async fn execute(&self, command: &mut Command) -> Result<Value> {
        let pending = &self.inner.shared.pending;

        let (id, mut reply) = pending.register()?;
        command.id = id;
        let _entry = PendingGuard { pending, id };

        let frame: Bytes = JsonCodec::encode(&command.request(id)).map_err(|e| {
            SocketError::write_failed(format!("failed to encode {} (id {})", command.method, id), Some(e))
        })?;

        tracing::trace!(id, method = %command.method, "Sending command");
        // Teardown resolves the reply even while the write is still stuck.
        let written = tokio::select! {
            biased;
            outcome = &mut reply => return reply_outcome(outcome, &command.method, id),
            written = self.inner.writer.write(frame) => written,
        };
        written.map_err(|e| {
            SocketError::write_failed(format!("failed to write {} (id {})", command.method, id), Some(e))
        })?;

        reply_outcome(reply.await, &command.method, id)
    }

    /// Register a handler for an event. Never fails.
    pub fn add_event_handler<F, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner
            .shared
            .registry
            .register(method, FnHandler::new(handler));
    }

    /// Register a handler receiving the event params deserialized into `T`.
    pub fn on<F, T, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner
            .shared
            .registry
            .register(method, TypedHandler::new(handler));
    }

    /// Register any [`EventHandler`] implementation.
    pub fn add_handler<H: EventHandler>(&self, method: &str, handler: H) {
        self.inner.shared.registry.register(method, handler);
    }

    /// Remove every handler for an event. Returns how many were removed.
    pub fn remove_event_handlers(&self, method: &str) -> usize {
        self.inner.shared.registry.remove(method)
    }

    /// Close the connection and wait for teardown.
    ///
    /// Every caller still waiting for a reply fails with
    /// [`SocketError::ReadFailed`]. Calling this again is a no-op.
    pub async fn close(&self) {
        if !self.inner.closing.swap(true, Ordering::AcqRel) {
            tracing::debug!("Closing dispatcher");
            self.inner.shutdown_tx.send_replace(true);
            self.closed().await;

            match self.inner.writer.close(self.inner.config.close_timeout).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    tracing::warn!("Transport did not close in time, abandoning write half");
                    self.inner.writer_task.abort();
                }
                Err(e) => tracing::warn!("Error closing transport: {}", e),
            }
        }
        self.closed().await;
    }

    /// Wait until the connection has been torn down, for whatever reason.
    pub async fn closed(&self) {
        let mut closed = self.inner.closed_rx.clone();
        // Err means the receive loop is gone, which is also closed.
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Whether the connection has been torn down.
    pub fn is_closed(&self) -> bool {
        *self.inner.closed_rx.borrow()
    }

    /// Number of commands still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.shared.pending.len()
    }

    /// Number of outgoing frames queued for the writer task.
    pub fn queued_frames(&self) -> usize {
        self.inner.writer.queued()
    }
}

fn reply_outcome(
    received: std::result::Result<Result<Value>, oneshot::error::RecvError>,
    method: &str,
    id: u64,
) -> Result<Value> {
    match received {
        Ok(outcome) => outcome,
        Err(_) => Err(SocketError::read_failed(
            format!("{} (id {}) was dropped without a reply", method, id),
            None::<io::Error>,
        )),
    }
}

/// Removes a pending entry when the sending future completes or is dropped.
struct PendingGuard<'a> {
    pending: &'a PendingTable,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.id);
    }
}

/// Main receive loop - reads frames until the connection fails, then tears
/// down.
async fn receive_loop<R: FrameRead>(
    mut reader: R,
    shared: Arc<Shared>,
    mut shutdown_rx: watch::Receiver<bool>,
    closed_tx: watch::Sender<bool>,
) {
    let failure = loop {
        let read = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                break SocketError::read_failed("connection closed locally", None::<io::Error>);
            }
            read = reader.read_frame() => read,
        };

        match read {
            Ok(Some(frame)) => {
                if let Err(e) = dispatch_frame(&frame, &shared) {
                    break e;
                }
            }
            Ok(None) => {
                break SocketError::read_failed("connection closed by remote", None::<io::Error>);
            }
            Err(e) => {
                break SocketError::read_failed("failed to read frame", Some(e));
            }
        }
    };

    let failed = shared.pending.drain(&failure);
    if failed > 0 {
        tracing::error!(pending = failed, "Receive loop ended: {}", failure);
    } else {
        tracing::debug!("Receive loop ended: {}", failure);
    }
    closed_tx.send_replace(true);
}

/// Decode one frame and deliver it.
///
/// Only an undecodable frame is an error; everything else that cannot be
/// delivered is logged and dropped.
fn dispatch_frame(bytes: &[u8], shared: &Shared) -> Result<()> {
    tracing::trace!(frame = %String::from_utf8_lossy(bytes), "Received frame");

    let envelope: Envelope = JsonCodec::decode(bytes)
        .map_err(|e| SocketError::read_failed("failed to decode frame", Some(e)))?;

    match envelope.into_frame() {
        Frame::Reply { id, outcome } => {
            let outcome = outcome.map_err(|response| {
                SocketError::error_response(format!("command {} was rejected", id), response)
            });
            if !shared.pending.resolve(id, outcome) {
                tracing::warn!(id, "Dropping reply for unknown request id");
            }
        }
        Frame::Event {
            method,
            params,
            session_id,
        } => dispatch_event(
            Event {
                method,
                params,
                session_id,
            },
            shared,
        ),
        Frame::Request { id, method } => {
            tracing::warn!(id, %method, "Dropping request from remote side");
        }
        Frame::Unknown => {
            tracing::warn!("Dropping frame with neither id nor method");
        }
    }

    Ok(())
}

/// Spawn one task per handler registered for the event.
fn dispatch_event(event: Event, shared: &Shared) {
    let handlers = shared.registry.snapshot(&event.method);
    if handlers.is_empty() {
        tracing::debug!(method = %event.method, "No handlers for event");
        return;
    }

    for handler in handlers {
        let event = event.clone();
        let semaphore = shared.handler_semaphore.clone();
        tokio::spawn(async move {
            // Permit is held until this invocation completes.
            let _permit = match semaphore.acquire_owned().await {
                Ok(p) => p,
                Err(_) => return,
            };
            handler.call(event).await;
        });
    }
}
