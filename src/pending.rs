//! Pending request table.
//!
//! Maps request ids to the one-shot channel of the caller waiting for the
//! reply. The id counter lives under the same lock as the map, so ids are
//! assigned and registered atomically and can never collide.
//!
//! Every entry leaves the table exactly once, by whichever comes first:
//! - [`PendingTable::resolve`] - the reply arrived
//! - [`PendingTable::remove`] - the caller gave up (write failure, timeout, drop)
//! - [`PendingTable::drain`] - the connection was torn down

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{Result, SocketError};

/// Receiving end handed to the caller on registration.
pub type ReplyReceiver = oneshot::Receiver<Result<Value>>;

struct TableState {
    next_id: u64,
    entries: HashMap<u64, oneshot::Sender<Result<Value>>>,
    /// Set by `drain`; no further registrations are accepted.
    closed: bool,
}

/// Mapping from request id to waiting caller.
pub struct PendingTable {
    state: Mutex<TableState>,
}

impl PendingTable {
    /// Create an empty table. The first id handed out is 1.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TableState {
                next_id: 1,
                entries: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Assign the next id and register a waiter for it.
    ///
    /// # Errors
    ///
    /// - `ReadFailed` if the table was drained (connection already gone)
    /// - `WriteFailed` if the id is somehow still pending
    #[track_caller]
    pub fn register(&self) -> Result<(u64, ReplyReceiver)> {
        let mut state = self.state.lock();

        if state.closed {
            return Err(SocketError::read_failed(
                "connection is closed",
                None::<std::io::Error>,
            ));
        }

        let id = state.next_id;
        if state.entries.contains_key(&id) {
            return Err(SocketError::write_failed(
                format!("request id {} is already pending", id),
                None::<std::io::Error>,
            ));
        }
        state.next_id += 1;

        let (tx, rx) = oneshot::channel();
        state.entries.insert(id, tx);
        Ok((id, rx))
    }

    /// Remove the entry for `id` and deliver `outcome` to its waiter.
    ///
    /// Returns `false` if no entry exists (unknown, duplicate or abandoned
    /// reply). Delivering to a waiter that already went away is not an error.
    pub fn resolve(&self, id: u64, outcome: Result<Value>) -> bool {
        let entry = self.state.lock().entries.remove(&id);
        match entry {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Remove the entry for `id` without resolving it.
    pub fn remove(&self, id: u64) -> bool {
        self.state.lock().entries.remove(&id).is_some()
    }

    /// Resolve every entry with `error`, clear the table and refuse further
    /// registrations. Returns how many waiters were failed.
    pub fn drain(&self, error: &SocketError) -> usize {
        let entries = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.entries)
        };

        let count = entries.len();
        for (_, tx) in entries {
            let _ = tx.send(Err(error.clone()));
        }
        count
    }

    /// Number of requests still waiting for a reply.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether no request is waiting.
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the table has been drained.
    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}
