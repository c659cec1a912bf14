use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use snapgate_realtime::{DeliveryOutcome, MessageKind};
use tracing::info;

use crate::state::SharedState;

fn default_kind() -> MessageKind {
    MessageKind::PhotoUploaded
}

fn default_ack() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    pub owner_id: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: MessageKind,
    #[serde(default)]
    pub data: Value,
    #[serde(default = "default_ack")]
    pub ack_required: bool,
}

/// POST /api/sessions/{session_id}/notify
///
/// Deliver a notification to the owner of a session. Always answers 200:
/// a missing or dead recipient is a local condition, never an error for
/// the caller that triggered the notification.
pub async fn notify_owner(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
    Json(body): Json<NotifyRequest>,
) -> Json<Value> {
    let outcome = state
        .realtime
        .dispatcher
        .send_to_owner(
            &session_id,
            &body.owner_id,
            body.kind,
            body.data,
            body.ack_required,
        )
        .await;

    match outcome {
        DeliveryOutcome::Delivered { sequence } => {
            state.metrics.notifications_sent.inc();
            info!(%session_id, owner = %body.owner_id, sequence, "notification delivered");
            Json(json!({ "delivered": true, "sequence": sequence }))
        }
        DeliveryOutcome::NoRecipient => {
            Json(json!({ "delivered": false, "reason": "no_recipient" }))
        }
        DeliveryOutcome::Failed => {
            state.metrics.notifications_failed.inc();
            Json(json!({ "delivered": false, "reason": "send_failed" }))
        }
    }
}
