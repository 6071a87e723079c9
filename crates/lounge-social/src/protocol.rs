//! Wire payloads that ride inside realtime broadcasts.
//!
//! The transport envelope (Phoenix Channels protocol) is handled by
//! `realtime`; everything here is the application-level JSON.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Broadcast event names
// ---------------------------------------------------------------------------

pub mod events {
    pub const TYPING: &str = "typing";
}

// ---------------------------------------------------------------------------
// Broadcast payloads
// ---------------------------------------------------------------------------

/// Typing start/stop signal from one peer.
///
/// Display name and avatar are carried on the wire so receivers can
/// render the indicator without a profile lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub peer_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    pub is_active: bool,
    /// Sender clock, epoch milliseconds, strictly increasing per sender.
    pub emitted_at: u64,
}

impl PresenceEvent {
    /// Parse a broadcast payload. Returns `None` for malformed input.
    pub fn from_payload(payload: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(payload.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn presence_event_wire_format() {
        let event = PresenceEvent {
            peer_id: "u1".into(),
            display_name: "Ana".into(),
            avatar_ref: None,
            is_active: true,
            emitted_at: 17,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"peer_id": "u1", "display_name": "Ana", "is_active": true, "emitted_at": 17})
        );
        assert_eq!(PresenceEvent::from_payload(&value), Some(event));
    }

    #[test]
    fn malformed_payload_is_rejected() {
        assert!(PresenceEvent::from_payload(&json!({"peer_id": "u1"})).is_none());
        assert!(PresenceEvent::from_payload(&json!("typing")).is_none());
    }

    #[test]
    fn avatar_is_optional_on_input() {
        let event = PresenceEvent::from_payload(&json!({
            "peer_id": "u2",
            "display_name": "Bo",
            "avatar_ref": "avatars/u2.png",
            "is_active": false,
            "emitted_at": 1
        }))
        .unwrap();
        assert_eq!(event.avatar_ref.as_deref(), Some("avatars/u2.png"));
        assert!(!event.is_active);
    }
}
