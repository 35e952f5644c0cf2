//! Wire types for the SFU control API
//!
//! ICE/DTLS/RTP parameter blobs are opaque to the signaling layer: they are
//! carried as `serde_json::Value` and passed through between the client and
//! the SFU without interpretation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a WebRTC transport, from the participant's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    Send,
    Recv,
}

impl fmt::Display for TransportDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send => write!(f, "send"),
            Self::Recv => write!(f, "recv"),
        }
    }
}

/// Media kind of a producer or consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Router RTP capabilities descriptor, forwarded verbatim to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouterCapabilities(pub serde_json::Value);

/// Transport descriptor returned by the SFU on creation.
///
/// The parameter blobs are relayed to the client so it can complete ICE/DTLS
/// negotiation directly with the SFU.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportDescriptor {
    pub id: String,
    pub ice_parameters: serde_json::Value,
    pub ice_candidates: serde_json::Value,
    pub dtls_parameters: serde_json::Value,
}

/// Producer descriptor returned by the SFU on creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerDescriptor {
    pub id: String,
}

/// Consumer descriptor returned by the SFU on creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerDescriptor {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_direction_serialization() {
        let json = serde_json::to_string(&TransportDirection::Send)
            .expect("TransportDirection should serialize");
        assert_eq!(json, "\"send\"");

        let parsed: TransportDirection =
            serde_json::from_str("\"recv\"").expect("TransportDirection should deserialize");
        assert_eq!(parsed, TransportDirection::Recv);
    }

    #[test]
    fn test_transport_descriptor_camel_case() {
        let descriptor = TransportDescriptor {
            id: "t1".to_string(),
            ice_parameters: serde_json::json!({"usernameFragment": "abcd"}),
            ice_candidates: serde_json::json!([]),
            dtls_parameters: serde_json::json!({"role": "auto"}),
        };

        let json = serde_json::to_string(&descriptor).expect("descriptor should serialize");
        assert!(json.contains("iceParameters"));
        assert!(json.contains("dtlsParameters"));
        assert!(!json.contains("ice_parameters"));
    }

    #[test]
    fn test_consumer_descriptor_round_trip() {
        let json = r#"{
            "id": "c1",
            "producerId": "p1",
            "kind": "video",
            "rtpParameters": {"codecs": []}
        }"#;

        let descriptor: ConsumerDescriptor =
            serde_json::from_str(json).expect("descriptor should deserialize");
        assert_eq!(descriptor.producer_id, "p1");
        assert_eq!(descriptor.kind, MediaKind::Video);
    }
}
