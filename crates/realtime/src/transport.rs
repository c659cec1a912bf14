use async_trait::async_trait;
use thiserror::Error;

/// Close code sent when the reaper ends a connection that stopped
/// heartbeating.
pub const CLOSE_STALE: u16 = 4000;
/// Close code sent to a connection displaced by a reconnect for the same
/// (session, owner) pair.
pub const CLOSE_REPLACED: u16 = 4001;

/// Opaque handle for one registered realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Io(String),
}

/// Outbound side of a realtime connection.
///
/// The registry owns connections for their registered lifetime; the
/// underlying socket belongs to the transport layer. Implementations must be
/// safe to call concurrently — the dispatcher serializes writes per
/// connection, but the reaper may close a connection while a send is in
/// flight.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Attempt a graceful close. Errors are advisory; callers must proceed
    /// with registry cleanup either way.
    async fn close(&self, code: u16, reason: &str) -> Result<(), TransportError>;
}
