//! Connection registry — the sole mutable index of live sessions.
//!
//! Maps a [`ConnId`] to its decoding stream and its outbound frame channel.
//! An entry exists exactly while the WebSocket is open: [`Registry::open`]
//! inserts on upgrade, [`Registry::close`] removes on disconnect. The
//! dispatcher may keep `Arc` clones of a stream past `close`; only the
//! registry entry goes away, and [`Registry::send`] turns into a no-op.
//!
//! Sends are not written to the socket here. [`Registry::send`] enqueues the
//! text frame onto the connection's egress channel; the per-connection
//! egress task drains that channel and owns the socket's write half, so
//! frame serialization for one connection is never concurrent with itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use hark_core::SttStream;

/// Opaque, copy-cheap handle identifying one WebSocket session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Per-connection bookkeeping held while the connection is open.
struct Connection {
    stream: Arc<dyn SttStream>,
    outbound: mpsc::UnboundedSender<String>,
}

/// Authoritative map of open connections.
pub struct Registry {
    next_id: AtomicU64,
    connections: Mutex<HashMap<ConnId, Connection>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Register a newly opened connection and allocate its handle.
    pub fn open(
        &self,
        stream: Arc<dyn SttStream>,
        outbound: mpsc::UnboundedSender<String>,
    ) -> ConnId {
        let id = ConnId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let active = {
            let mut connections = self.connections.lock().unwrap();
            connections.insert(id, Connection { stream, outbound });
            connections.len()
        };
        info!(conn = %id, active, "connection opened");
        id
    }

    /// Remove a closed connection. Returns false if it was already gone.
    ///
    /// Dropping the entry also drops the egress sender, which lets the
    /// egress task wind down once it has drained what was already queued.
    pub fn close(&self, id: ConnId) -> bool {
        let (removed, active) = {
            let mut connections = self.connections.lock().unwrap();
            let removed = connections.remove(&id).is_some();
            (removed, connections.len())
        };
        if removed {
            info!(conn = %id, active, "connection closed");
        }
        removed
    }

    /// Whether `id` is currently open.
    pub fn contains(&self, id: ConnId) -> bool {
        self.connections.lock().unwrap().contains_key(&id)
    }

    /// The decoding stream of an open connection.
    pub fn stream(&self, id: ConnId) -> Option<Arc<dyn SttStream>> {
        self.connections
            .lock()
            .unwrap()
            .get(&id)
            .map(|conn| Arc::clone(&conn.stream))
    }

    /// Queue a text frame for `id`'s egress task.
    ///
    /// No-op when the connection has already closed (a normal race with
    /// disconnect, not an error).
    pub fn send(&self, id: ConnId, text: String) {
        let connections = self.connections.lock().unwrap();
        let Some(conn) = connections.get(&id) else {
            debug!(conn = %id, "dropping frame for closed connection");
            return;
        };
        if conn.outbound.send(text).is_err() {
            debug!(conn = %id, "egress channel gone; dropping frame");
        }
    }

    /// Number of currently open connections.
    pub fn active_connections(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
