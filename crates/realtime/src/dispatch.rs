use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::liveness::LivenessMonitor;
use crate::protocol::{Envelope, MessageKind, PhotoUploaded};
use crate::registry::ConnectionRegistry;

/// Result of one notification dispatch.
///
/// A missing recipient is an expected, non-exceptional condition; `Failed`
/// means the transport write failed or timed out and the connection was torn
/// down. Callers are free to ignore the outcome — a notification failure
/// must never fail the business operation that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { sequence: u64 },
    NoRecipient,
    Failed,
}

/// Composes envelopes and delivers them to a session owner's connection.
#[derive(Clone)]
pub struct NotificationDispatcher {
    registry: Arc<ConnectionRegistry>,
    liveness: LivenessMonitor,
    send_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        liveness: LivenessMonitor,
        send_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            liveness,
            send_timeout,
        }
    }

    /// Deliver an enveloped message to the owner's connection for a session.
    ///
    /// The sequence assignment and the write happen under the connection's
    /// send lock, so sequences reach the wire strictly in order even when
    /// dispatches race on the same connection.
    pub async fn send_to_owner(
        &self,
        session_id: &str,
        owner: &str,
        kind: MessageKind,
        data: Value,
        ack_required: bool,
    ) -> DeliveryOutcome {
        let Some(entry) = self.registry.lookup(session_id, owner) else {
            debug!(session_id, owner, "owner not connected, skipping notification");
            return DeliveryOutcome::NoRecipient;
        };

        let _guard = entry.send_lock.lock().await;

        // The connection may have been torn down between the lookup and
        // here; without a sequence nothing goes on the wire.
        let Some(sequence) = self.liveness.next_sequence(entry.id) else {
            debug!(session_id, owner, "connection vanished before dispatch");
            return DeliveryOutcome::NoRecipient;
        };
        let envelope = Envelope::new(kind, sequence, session_id, data, ack_required);
        let text = match serde_json::to_string(&envelope) {
            Ok(text) => text,
            Err(e) => {
                warn!(session_id, owner, error = %e, "failed to serialize envelope");
                return DeliveryOutcome::Failed;
            }
        };

        match tokio::time::timeout(self.send_timeout, entry.transport.send_text(text)).await {
            Ok(Ok(())) => {
                entry.touch();
                debug!(session_id, owner, sequence, "notification delivered");
                DeliveryOutcome::Delivered { sequence }
            }
            Ok(Err(e)) => {
                warn!(session_id, owner, error = %e, "notification send failed, dropping connection");
                self.registry.disconnect(entry.id);
                DeliveryOutcome::Failed
            }
            Err(_) => {
                warn!(session_id, owner, "notification send timed out, dropping connection");
                self.registry.disconnect(entry.id);
                DeliveryOutcome::Failed
            }
        }
    }

    /// Notify a session owner that a photo landed in their session.
    pub async fn notify_photo_uploaded(
        &self,
        session_id: &str,
        owner: &str,
        photo: PhotoUploaded,
    ) -> DeliveryOutcome {
        let data = match serde_json::to_value(&photo) {
            Ok(data) => data,
            Err(e) => {
                warn!(session_id, owner, error = %e, "failed to serialize photo payload");
                return DeliveryOutcome::Failed;
            }
        };
        self.send_to_owner(session_id, owner, MessageKind::PhotoUploaded, data, true)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockTransport;
    use serde_json::json;

    fn setup() -> (Arc<ConnectionRegistry>, NotificationDispatcher) {
        let registry = Arc::new(ConnectionRegistry::new());
        let liveness = LivenessMonitor::new(Arc::clone(&registry));
        let dispatcher = NotificationDispatcher::new(
            Arc::clone(&registry),
            liveness,
            Duration::from_millis(500),
        );
        (registry, dispatcher)
    }

    #[tokio::test]
    async fn delivers_enveloped_messages_in_sequence() {
        let (registry, dispatcher) = setup();
        let transport = Arc::new(MockTransport::new());
        registry.connect(transport.clone(), "s1", Some("u1"));

        let first = dispatcher
            .notify_photo_uploaded(
                "s1",
                "u1",
                PhotoUploaded {
                    filename: "a.jpg".to_string(),
                    url: "https://cdn.example/a.jpg".to_string(),
                    upload_count: 1,
                    uploaded_by: None,
                },
            )
            .await;
        assert_eq!(first, DeliveryOutcome::Delivered { sequence: 1 });

        let second = dispatcher
            .send_to_owner("s1", "u1", MessageKind::PhotoUploaded, json!({}), true)
            .await;
        assert_eq!(second, DeliveryOutcome::Delivered { sequence: 2 });

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        let envelope: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(envelope["type"], "photo_uploaded");
        assert_eq!(envelope["sequence"], 1);
        assert_eq!(envelope["session_id"], "s1");
        assert_eq!(envelope["data"]["filename"], "a.jpg");
    }

    #[tokio::test]
    async fn missing_recipient_is_a_silent_no_op() {
        let (_registry, dispatcher) = setup();
        let outcome = dispatcher
            .send_to_owner("s1", "nobody", MessageKind::PhotoUploaded, json!({}), false)
            .await;
        assert_eq!(outcome, DeliveryOutcome::NoRecipient);
    }

    #[tokio::test]
    async fn anonymous_connection_receives_nothing() {
        let (registry, dispatcher) = setup();
        let transport = Arc::new(MockTransport::new());
        registry.connect(transport.clone(), "s1", None);

        let outcome = dispatcher
            .send_to_owner("s1", "u1", MessageKind::PhotoUploaded, json!({}), false)
            .await;
        assert_eq!(outcome, DeliveryOutcome::NoRecipient);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn send_failure_tears_down_the_connection() {
        let (registry, dispatcher) = setup();
        let transport = Arc::new(MockTransport::failing());
        registry.connect(transport, "s1", Some("u1"));

        let outcome = dispatcher
            .send_to_owner("s1", "u1", MessageKind::PhotoUploaded, json!({}), false)
            .await;
        assert_eq!(outcome, DeliveryOutcome::Failed);

        // Connection is gone; the next dispatch is a clean no-op.
        let next = dispatcher
            .send_to_owner("s1", "u1", MessageKind::PhotoUploaded, json!({}), false)
            .await;
        assert_eq!(next, DeliveryOutcome::NoRecipient);
    }

    #[tokio::test]
    async fn slow_send_counts_as_failure() {
        let (registry, dispatcher) = setup();
        let transport = Arc::new(MockTransport::hanging());
        registry.connect(transport, "s1", Some("u1"));

        let outcome = dispatcher
            .send_to_owner("s1", "u1", MessageKind::PhotoUploaded, json!({}), false)
            .await;
        assert_eq!(outcome, DeliveryOutcome::Failed);
        assert!(registry.lookup("s1", "u1").is_none());
    }

    #[tokio::test]
    async fn dispatch_racing_disconnect_never_writes_sequence_zero() {
        let (registry, dispatcher) = setup();
        let transport = Arc::new(MockTransport::new());
        let id = registry.connect(transport.clone(), "s1", Some("u1"));

        let mut handles = vec![];
        for _ in 0..10 {
            let dispatcher = dispatcher.clone();
            handles.push(tokio::spawn(async move {
                dispatcher
                    .send_to_owner("s1", "u1", MessageKind::PhotoUploaded, json!({}), false)
                    .await
            }));
        }
        let racing_registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            racing_registry.disconnect(id);
            DeliveryOutcome::NoRecipient
        }));

        for h in handles {
            match h.await.unwrap() {
                DeliveryOutcome::Delivered { sequence } => assert!(sequence >= 1),
                DeliveryOutcome::NoRecipient => {}
                DeliveryOutcome::Failed => panic!("transport does not fail in this test"),
            }
        }

        // Whatever subset got through, every frame carries a real sequence.
        for frame in transport.sent() {
            let envelope: serde_json::Value = serde_json::from_str(&frame).unwrap();
            assert!(envelope["sequence"].as_u64().unwrap() >= 1);
        }
    }

    #[tokio::test]
    async fn delivery_counts_as_heartbeat() {
        let (registry, dispatcher) = setup();
        let transport = Arc::new(MockTransport::new());
        let id = registry.connect(transport, "s1", Some("u1"));

        let entry = registry.get(id).unwrap();
        *entry.last_heartbeat.lock().unwrap() =
            std::time::Instant::now() - Duration::from_secs(600);

        dispatcher
            .send_to_owner("s1", "u1", MessageKind::PhotoUploaded, json!({}), false)
            .await;

        assert!(entry.last_heartbeat().elapsed() < Duration::from_secs(1));
    }
}
