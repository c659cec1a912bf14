use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Wire message discriminator for the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Connected,
    OwnerConnected,
    Ping,
    Pong,
    Ack,
    Echo,
    PhotoUploaded,
}

/// Metadata wrapper added to every dispatcher-originated message.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub sequence: u64,
    pub timestamp: String,
    pub ack_required: bool,
    pub session_id: String,
    pub data: Value,
}

impl Envelope {
    pub fn new(
        kind: MessageKind,
        sequence: u64,
        session_id: &str,
        data: Value,
        ack_required: bool,
    ) -> Self {
        Self {
            kind,
            sequence,
            timestamp: chrono::Utc::now().to_rfc3339(),
            ack_required,
            session_id: session_id.to_string(),
            data,
        }
    }
}

/// Payload for a `photo_uploaded` notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoUploaded {
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub upload_count: u64,
    #[serde(default)]
    pub uploaded_by: Option<String>,
}

/// Inbound message from the peer, after lenient parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Ping,
    Ack { sequence: Option<u64> },
    /// Anything unrecognized or malformed. The connection stays open and the
    /// raw text is echoed back.
    Other(String),
}

/// Parse an inbound frame. Never fails: a frame that isn't valid JSON or
/// doesn't carry a known `type` falls back to [`ClientMessage::Other`].
pub fn parse_client_message(raw: &str) -> ClientMessage {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return ClientMessage::Other(raw.to_string());
    };

    match value.get("type").and_then(Value::as_str) {
        Some("ping") => ClientMessage::Ping,
        Some("ack") => ClientMessage::Ack {
            sequence: value.get("sequence").and_then(Value::as_u64),
        },
        _ => ClientMessage::Other(raw.to_string()),
    }
}

/// Handshake greeting sent once right after connect; not enveloped since no
/// sequence has been assigned yet.
pub fn greeting(kind: MessageKind, session_id: &str) -> Value {
    json!({
        "type": kind,
        "session_id": session_id,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}

pub fn pong() -> Value {
    json!({
        "type": MessageKind::Pong,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}

pub fn echo_reply(raw: &str) -> Value {
    json!({
        "type": MessageKind::Echo,
        "data": raw,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}
