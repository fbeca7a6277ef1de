use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
use crate::error::ProtocolError;
use crate::types::Room;

/// Wire form of a chat message.
///
/// Encoded as a JSON object so peers can skip fields they do not know.
/// `isFromCurrentUser` never travels: the receiver always treats a payload
/// as someone else's message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Payloads from peers that predate the tag decode as version 1.
    #[serde(default = "default_version")]
    pub version: u16,
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "senderID")]
    pub sender_id: String,
    #[serde(rename = "senderName")]
    pub sender_name: String,
    #[serde(rename = "roomID")]
    pub room: Room,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Drawing or other binary attachment, base64 on the wire
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub attachment: Option<Vec<u8>>,
}

fn default_version() -> u16 {
    PROTOCOL_VERSION
}

impl MessagePayload {
    /// True when the payload carries neither text nor an attachment.
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.attachment.is_none()
    }

    /// True when the sender speaks a later protocol than this build.
    /// Fields this build knows are still read; anything else is ignored.
    pub fn is_newer_version(&self) -> bool {
        self.version > PROTOCOL_VERSION
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(bytes)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: data.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(serde_json::from_slice(data)?)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_str(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MessagePayload {
        MessagePayload {
            version: PROTOCOL_VERSION,
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sender_id: "u-1".into(),
            sender_name: "Ana".into(),
            room: Room::B,
            text: Some("hello".into()),
            attachment: Some(vec![0, 1, 2, 254, 255]),
        }
    }

    #[test]
    fn test_payload_roundtrip() {
        let payload = sample();
        let bytes = payload.to_bytes().unwrap();
        let restored = MessagePayload::from_bytes(&bytes).unwrap();
        assert_eq!(payload, restored);
    }

    #[test]
    fn test_wire_field_names() {
        let json: serde_json::Value = serde_json::from_slice(&sample().to_bytes().unwrap()).unwrap();
        assert_eq!(json["roomID"], "B");
        assert_eq!(json["senderID"], "u-1");
        assert_eq!(json["senderName"], "Ana");
        assert_eq!(json["attachment"], "AAEC/v8=");
        assert!(json.get("isFromCurrentUser").is_none());
    }

    #[test]
    fn test_untagged_payload_decodes_as_v1() {
        let raw = br#"{
            "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "timestamp": "2024-05-01T10:00:00Z",
            "senderID": "x",
            "senderName": "X",
            "roomID": "A",
            "text": "hi"
        }"#;
        let payload = MessagePayload::from_bytes(raw).unwrap();
        assert_eq!(payload.version, 1);
        assert_eq!(payload.room, Room::A);
        assert!(payload.attachment.is_none());
        assert!(!payload.is_empty());
        assert!(!payload.is_newer_version());
    }

    #[test]
    fn test_newer_version_still_decodes() {
        let raw = br#"{
            "version": 2,
            "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "timestamp": "2024-05-01T10:00:00Z",
            "senderID": "x",
            "senderName": "X",
            "roomID": "B",
            "text": "hi",
            "reactions": ["+1"]
        }"#;
        let payload = MessagePayload::from_bytes(raw).unwrap();
        assert!(payload.is_newer_version());
        assert_eq!(payload.text.as_deref(), Some("hi"));
    }

    #[test]
    fn test_malformed_payloads_rejected() {
        assert!(MessagePayload::from_bytes(b"not json").is_err());
        let unknown_room = br#"{"id":"67e55044-10b1-426f-9247-bb680e5fe0c8","timestamp":"2024-05-01T10:00:00Z","senderID":"x","senderName":"X","roomID":"Q"}"#;
        assert!(MessagePayload::from_bytes(unknown_room).is_err());
    }
}
