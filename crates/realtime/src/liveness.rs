use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::registry::ConnectionRegistry;
use crate::transport::{ConnectionId, CLOSE_STALE};

/// Tracks connection liveness and hands out per-connection sequence numbers.
///
/// Heartbeats are recorded both on explicit keep-alives from the peer and
/// implicitly on every successful outbound send. The reaper is the only
/// component allowed to close a connection from server-side policy rather
/// than in response to a disconnect event.
#[derive(Clone)]
pub struct LivenessMonitor {
    registry: Arc<ConnectionRegistry>,
}

impl LivenessMonitor {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Mark a connection as alive now.
    pub fn heartbeat(&self, id: ConnectionId) {
        if let Some(entry) = self.registry.get(id) {
            entry.touch();
        }
    }

    /// Atomically increment and return the connection's sequence counter,
    /// or `None` once the connection is gone. Callers must not put a
    /// message on the wire without a sequence: the peer is promised a
    /// gapless `1..N`.
    pub fn next_sequence(&self, id: ConnectionId) -> Option<u64> {
        self.registry
            .get(id)
            .map(|entry| entry.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Connections with no heartbeat within `timeout`. Pure query.
    pub fn stale_connections(&self, timeout: Duration) -> Vec<ConnectionId> {
        self.registry
            .connection_ids()
            .into_iter()
            .filter(|&id| {
                self.registry
                    .get(id)
                    .is_some_and(|entry| entry.last_heartbeat().elapsed() > timeout)
            })
            .collect()
    }

    /// Close and unregister every stale connection. The graceful close is
    /// best effort; registry cleanup runs unconditionally so a transport
    /// error cannot strand an entry. Returns the number reaped.
    pub async fn reap(&self, timeout: Duration) -> usize {
        let stale = self.stale_connections(timeout);
        let mut reaped = 0;

        for id in stale {
            // An organic disconnect may have raced the sweep.
            let Some(entry) = self.registry.get(id) else {
                continue;
            };

            if let Err(e) = entry
                .transport
                .close(CLOSE_STALE, "heartbeat timeout")
                .await
            {
                warn!(conn = %id, error = %e, "graceful close failed for stale connection");
            }
            self.registry.disconnect(id);
            reaped += 1;
        }

        if reaped > 0 {
            info!(reaped, "reaped stale connections");
        }
        reaped
    }

    /// Spawn the periodic reaper sweep. Runs until the runtime shuts down.
    pub fn spawn_reaper(&self, interval: Duration, timeout: Duration) -> tokio::task::JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let reaped = monitor.reap(timeout).await;
                debug!(reaped, "reaper sweep complete");
            }
        })
    }
}
