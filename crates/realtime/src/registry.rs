use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::transport::{ConnectionId, Transport, CLOSE_REPLACED};

/// Live state for one connection: identity, transport handle, and the
/// mutable liveness record (heartbeat timestamp and sequence counter).
pub struct ConnectionEntry {
    pub id: ConnectionId,
    pub session_id: String,
    pub owner: Option<String>,
    pub transport: Arc<dyn Transport>,
    pub(crate) last_heartbeat: Mutex<Instant>,
    pub(crate) sequence: AtomicU64,
    /// Serializes dispatches targeting this connection so sequence numbers
    /// hit the wire in the order they were assigned.
    pub(crate) send_lock: tokio::sync::Mutex<()>,
}

impl ConnectionEntry {
    pub(crate) fn touch(&self) {
        *self
            .last_heartbeat
            .lock()
            .expect("heartbeat lock poisoned") = Instant::now();
    }

    pub(crate) fn last_heartbeat(&self) -> Instant {
        *self
            .last_heartbeat
            .lock()
            .expect("heartbeat lock poisoned")
    }
}

/// Registry of live realtime connections, keyed by (session, owner).
///
/// Owner-bearing connections are routed notifications; anonymous connections
/// complete the handshake and get liveness tracking (so the reaper covers
/// them) but are deliberately never placed in the session map — they receive
/// nothing after the greeting.
pub struct ConnectionRegistry {
    /// session id -> owner user id -> connection. At most one connection per
    /// (session, owner) pair.
    sessions: DashMap<String, HashMap<String, ConnectionId>>,
    connections: DashMap<ConnectionId, Arc<ConnectionEntry>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            connections: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a connection whose transport handshake has already been
    /// accepted by the caller.
    ///
    /// A reconnect for a (session, owner) pair that is already registered
    /// displaces the previous connection: the old transport is closed with
    /// [`CLOSE_REPLACED`] and its state removed, rather than silently leaked.
    pub fn connect(
        &self,
        transport: Arc<dyn Transport>,
        session_id: &str,
        owner: Option<&str>,
    ) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let entry = Arc::new(ConnectionEntry {
            id,
            session_id: session_id.to_string(),
            owner: owner.map(str::to_string),
            transport,
            last_heartbeat: Mutex::new(Instant::now()),
            sequence: AtomicU64::new(0),
            send_lock: tokio::sync::Mutex::new(()),
        });
        self.connections.insert(id, entry);

        match owner {
            Some(owner_id) => {
                let displaced = self
                    .sessions
                    .entry(session_id.to_string())
                    .or_default()
                    .insert(owner_id.to_string(), id);

                if let Some(old_id) = displaced {
                    warn!(
                        session_id,
                        owner = owner_id,
                        old = %old_id,
                        new = %id,
                        "reconnect displaced an existing connection"
                    );
                    if let Some(old) = self.get(old_id) {
                        let transport = Arc::clone(&old.transport);
                        // The graceful close needs a runtime; without one
                        // (synchronous callers), dropping the transport's
                        // last reference closes the socket anyway.
                        if let Ok(handle) = tokio::runtime::Handle::try_current() {
                            handle.spawn(async move {
                                let _ = transport
                                    .close(CLOSE_REPLACED, "replaced by reconnect")
                                    .await;
                            });
                        }
                    }
                    self.disconnect(old_id);
                }

                debug!(session_id, owner = owner_id, conn = %id, "owner connection registered");
            }
            None => {
                debug!(session_id, conn = %id, "anonymous connection accepted, not registered for delivery");
            }
        }

        id
    }

    /// Remove a connection and its session-map entry. Idempotent: a second
    /// disconnect for the same id is a no-op.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let Some((_, entry)) = self.connections.remove(&id) else {
            return false;
        };

        if let Some(owner) = &entry.owner {
            if let Some(mut owners) = self.sessions.get_mut(&entry.session_id) {
                // Only unregister if the slot still points at this
                // connection; a replacement may have overwritten it.
                if owners.get(owner) == Some(&id) {
                    owners.remove(owner);
                }
            }
            self.sessions
                .remove_if(&entry.session_id, |_, owners| owners.is_empty());
        }

        debug!(
            session_id = %entry.session_id,
            owner = entry.owner.as_deref().unwrap_or("anonymous"),
            conn = %id,
            "connection disconnected"
        );
        true
    }

    /// Routing lookup for notification delivery.
    pub fn lookup(&self, session_id: &str, owner: &str) -> Option<Arc<ConnectionEntry>> {
        let id = *self.sessions.get(session_id)?.get(owner)?;
        self.get(id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionEntry>> {
        self.connections.get(&id).map(|e| Arc::clone(e.value()))
    }

    /// Number of registered owner connections for a session.
    pub fn session_connection_count(&self, session_id: &str) -> usize {
        self.sessions.get(session_id).map_or(0, |m| m.len())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|e| *e.key()).collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
