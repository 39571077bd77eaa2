//! Event values and the handler abstraction.
//!
//! Handlers are stored as `Arc<dyn EventHandler>` so the receive loop can
//! snapshot them and run each invocation on its own task. Closures are
//! adapted by [`FnHandler`] (raw [`Event`]) and [`TypedHandler`] (params
//! deserialized into `T` first). Anything else, e.g. a synchronous recording
//! stub in a test, can implement [`EventHandler`] directly.

use std::future::Future;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::codec::JsonCodec;
use crate::BoxFuture;

/// A server-pushed event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event name, e.g. `"Network.requestWillBeSent"`.
    pub method: String,
    /// Event payload; `Value::Null` if the frame had no params.
    pub params: Value,
    /// Session the event belongs to on flattened multi-target connections.
    pub session_id: Option<String>,
}

impl Event {
    /// Create an event without a session.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            session_id: None,
        }
    }
}

/// Trait for event handlers.
pub trait EventHandler: Send + Sync + 'static {
    /// Handle one occurrence of an event.
    fn call(&self, event: Event) -> BoxFuture<'static, ()>;
}

/// Adapter for closures taking the raw [`Event`].
pub struct FnHandler<F> {
    handler: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    /// Wrap a closure.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, event: Event) -> BoxFuture<'static, ()> {
        Box::pin((self.handler)(event))
    }
}

/// Wrapper that deserializes the event params before calling the handler.
///
/// Params that do not match `T` are logged and the handler is skipped.
pub struct TypedHandler<F, T, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, Fut> TypedHandler<F, T, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, Fut> EventHandler for TypedHandler<F, T, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, event: Event) -> BoxFuture<'static, ()> {
        let parsed: T = match JsonCodec::from_value(event.params) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(method = %event.method, "Dropping event with unexpected params: {}", e);
                return Box::pin(async {});
            }
        };

        Box::pin((self.handler)(parsed))
    }
}
