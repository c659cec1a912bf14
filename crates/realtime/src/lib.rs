//! Realtime notification subsystem for the snapgate gateway.
//!
//! A [`ConnectionRegistry`] owns the set of live WebSocket connections keyed
//! by (session, owner); a [`LivenessMonitor`] tracks heartbeats and sequence
//! numbers and reaps connections that go silent; a
//! [`NotificationDispatcher`] wraps payloads in ordered envelopes and
//! delivers them to session owners, treating a dead peer as a local cleanup
//! problem rather than an error for the triggering operation.
//!
//! Everything is in-memory and process-local. The transport (the actual
//! socket) is abstracted behind the [`Transport`] trait so the subsystem can
//! be exercised without a network.

pub mod dispatch;
pub mod liveness;
pub mod protocol;
pub mod registry;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

pub use dispatch::{DeliveryOutcome, NotificationDispatcher};
pub use liveness::LivenessMonitor;
pub use protocol::{ClientMessage, Envelope, MessageKind, PhotoUploaded};
pub use registry::{ConnectionEntry, ConnectionRegistry};
pub use transport::{ConnectionId, Transport, TransportError, CLOSE_REPLACED, CLOSE_STALE};

use snapgate_common::RealtimeConfig;

/// Bundles the registry, liveness monitor, and dispatcher behind one handle.
///
/// Constructed once at service start and injected into handlers; tests build
/// as many isolated hubs as they need.
#[derive(Clone)]
pub struct RealtimeHub {
    pub registry: Arc<ConnectionRegistry>,
    pub liveness: LivenessMonitor,
    pub dispatcher: NotificationDispatcher,
    heartbeat_timeout: Duration,
    reap_interval: Duration,
}

impl RealtimeHub {
    pub fn new(config: &RealtimeConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let liveness = LivenessMonitor::new(Arc::clone(&registry));
        let dispatcher = NotificationDispatcher::new(
            Arc::clone(&registry),
            liveness.clone(),
            Duration::from_millis(config.send_timeout_ms),
        );

        tracing::info!(
            heartbeat_timeout_mins = config.heartbeat_timeout_mins,
            reap_interval_secs = config.reap_interval_secs,
            send_timeout_ms = config.send_timeout_ms,
            "creating realtime hub"
        );

        Self {
            registry,
            liveness,
            dispatcher,
            heartbeat_timeout: Duration::from_secs(config.heartbeat_timeout_mins * 60),
            reap_interval: Duration::from_secs(config.reap_interval_secs),
        }
    }

    /// Start the background reaper sweep with the configured interval and
    /// heartbeat timeout.
    pub fn start_reaper(&self) -> tokio::task::JoinHandle<()> {
        self.liveness
            .spawn_reaper(self.reap_interval, self.heartbeat_timeout)
    }
}
