//! Event registry mapping event names to handlers.
//!
//! Registration appends; handlers for one name keep their registration
//! order. The receive loop never iterates the registry under its lock: it
//! takes a [`snapshot`](EventRegistry::snapshot) of the handler list and
//! releases the lock before invoking anything, so handlers may register
//! further handlers (or callers may register concurrently) without
//! disturbing an in-flight dispatch.
//!
//! # Example
//!
//! ```
//! use devtools_socket::event::{Event, EventRegistry, FnHandler};
//!
//! let registry = EventRegistry::new();
//! registry.register("Page.loadEventFired", FnHandler::new(|event: Event| async move {
//!     println!("loaded: {}", event.params);
//! }));
//!
//! assert_eq!(registry.handler_count("Page.loadEventFired"), 1);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::EventHandler;

/// Registry mapping event names to handlers.
pub struct EventRegistry {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
}

impl EventRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Append a handler for `method`.
    pub fn register<H: EventHandler>(&self, method: &str, handler: H) {
        self.register_arc(method, Arc::new(handler));
    }

    /// Append an already shared handler for `method`.
    pub fn register_arc(&self, method: &str, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .entry(method.to_string())
            .or_default()
            .push(handler);
    }

    /// Remove every handler for `method`, returning how many there were.
    pub fn remove(&self, method: &str) -> usize {
        self.handlers
            .write()
            .remove(method)
            .map(|list| list.len())
            .unwrap_or(0)
    }

    /// Copy of the handlers currently registered for `method`, in
    /// registration order.
    pub fn snapshot(&self, method: &str) -> Vec<Arc<dyn EventHandler>> {
        self.handlers
            .read()
            .get(method)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of handlers registered for `method`.
    pub fn handler_count(&self, method: &str) -> usize {
        self.handlers.read().get(method).map_or(0, Vec::len)
    }

    /// Names with at least one handler.
    pub fn methods(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}
