//! Signaling wire protocol
//!
//! Every message in either direction is a JSON envelope:
//!
//! ```json
//! {"event": "join-room", "requestId": "abc", "data": {"roomId": "r1", "displayName": "Alice"}}
//! ```
//!
//! Inbound events that expect a response always get one: a `ServerEnvelope`
//! with the same event name and echoed `requestId`, carrying either a
//! success payload or `{"error": {"code", "message"}}`. Relay payloads
//! (offer/answer/ice-candidate/chat) are opaque `serde_json::Value`s —
//! the server addresses them, it never interprets them.

use chrono::{DateTime, Utc};
use conclave_core::models::{ParticipantId, RoomId, RosterEntry};
use conclave_sfu::{MediaKind, TransportDirection};
use serde::{Deserialize, Serialize};

/// Inbound message envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEnvelope {
    pub event: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Outbound message envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEnvelope {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub data: serde_json::Value,
}

impl ServerEnvelope {
    /// Server-initiated event (no request to correlate with).
    #[must_use]
    pub fn event(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            request_id: None,
            data,
        }
    }

    /// Success response to a client request.
    #[must_use]
    pub fn response(
        event: impl Into<String>,
        request_id: Option<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            event: event.into(),
            request_id,
            data,
        }
    }

    /// Error response to a client request.
    #[must_use]
    pub fn error(
        event: impl Into<String>,
        request_id: Option<String>,
        code: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event: event.into(),
            request_id,
            data: serde_json::json!({
                "error": { "code": code, "message": message.into() }
            }),
        }
    }
}

// --- Inbound payloads ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomPayload {
    pub room_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransportPayload {
    pub direction: TransportDirection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectTransportPayload {
    pub transport_id: String,
    pub dtls_parameters: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducePayload {
    pub transport_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumePayload {
    pub transport_id: String,
    pub producer_id: String,
    pub rtp_capabilities: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerPayload {
    pub consumer_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerClosedPayload {
    pub producer_id: String,
}

/// Opaque relay: forwarded verbatim to the target participant, or to the
/// whole room (sender excluded) when no target is given.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayPayload {
    #[serde(default)]
    pub target_participant_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

// --- Outbound payloads ---

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoinedData {
    pub room_id: RoomId,
    pub participant_id: ParticipantId,
    pub capabilities: serde_json::Value,
    pub roster: Vec<RosterEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoinedEvent {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeftEvent {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProducerEvent {
    pub producer_id: String,
    pub participant_id: ParticipantId,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerClosedEvent {
    pub producer_id: String,
    pub participant_id: ParticipantId,
}

/// Wrapper around a relayed payload carrying the sender's identity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayEvent {
    pub from: ParticipantId,
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_envelope_deserialization() {
        let json = r#"{
            "event": "join-room",
            "requestId": "req-1",
            "data": {"roomId": "r1", "displayName": "Alice"}
        }"#;

        let envelope: ClientEnvelope =
            serde_json::from_str(json).expect("envelope should deserialize");
        assert_eq!(envelope.event, "join-room");
        assert_eq!(envelope.request_id.as_deref(), Some("req-1"));

        let payload: JoinRoomPayload =
            serde_json::from_value(envelope.data).expect("payload should deserialize");
        assert_eq!(payload.room_id, "r1");
        assert_eq!(payload.display_name, "Alice");
    }

    #[test]
    fn test_envelope_without_request_id() {
        let json = r#"{"event": "chat", "data": {"payload": "hello"}}"#;
        let envelope: ClientEnvelope =
            serde_json::from_str(json).expect("envelope should deserialize");
        assert!(envelope.request_id.is_none());

        let out = ServerEnvelope::event("chat", serde_json::json!({"from": "p1"}));
        let text = serde_json::to_string(&out).expect("envelope should serialize");
        assert!(!text.contains("requestId"));
    }

    #[test]
    fn test_error_envelope_shape() {
        let envelope = ServerEnvelope::error(
            "create-transport",
            Some("req-9".to_string()),
            "ERR_SFU",
            "SFU call failed",
        );
        let text = serde_json::to_string(&envelope).expect("envelope should serialize");
        assert!(text.contains("\"requestId\":\"req-9\""));
        assert!(text.contains("\"code\":\"ERR_SFU\""));
    }

    #[test]
    fn test_relay_payload_defaults() {
        let payload: RelayPayload =
            serde_json::from_str(r#"{"payload": {"sdp": "v=0"}}"#).expect("should deserialize");
        assert!(payload.target_participant_id.is_none());
        assert_eq!(payload.payload["sdp"], "v=0");
    }
}
