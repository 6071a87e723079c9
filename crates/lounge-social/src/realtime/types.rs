//! Configuration, protocol types, and event/command enums for the realtime client.

use lounge_config::RealtimeSettings;
use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::transport::{RowChange, RowFilter};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for connecting to Supabase Realtime.
#[derive(Clone)]
pub struct RealtimeConfig {
    /// Supabase project reference (e.g., "ojmqzagktzkualzgpcbq").
    pub project_ref: String,
    /// Supabase anon key (publishable).
    pub api_key: String,
    /// Optional access token (JWT) for authenticated connections.
    pub access_token: Option<String>,
    /// Heartbeat interval in seconds (default: 25).
    pub heartbeat_interval_secs: u64,
    /// Reconnect base delay in seconds.
    pub reconnect_delay_secs: u64,
    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay_secs: u64,
    /// Seconds to wait for a join reply before reporting `timed_out`.
    pub join_timeout_secs: u64,
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("project_ref", &self.project_ref)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("max_reconnect_delay_secs", &self.max_reconnect_delay_secs)
            .field("join_timeout_secs", &self.join_timeout_secs)
            .finish()
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        RealtimeSettings::default().into()
    }
}

impl From<RealtimeSettings> for RealtimeConfig {
    fn from(s: RealtimeSettings) -> Self {
        Self {
            project_ref: s.project_ref,
            api_key: s.api_key,
            access_token: s.access_token.filter(|t| !t.is_empty()),
            heartbeat_interval_secs: s.heartbeat_interval_secs,
            reconnect_delay_secs: s.reconnect_delay_secs,
            max_reconnect_delay_secs: s.max_reconnect_delay_secs,
            join_timeout_secs: s.join_timeout_secs,
        }
    }
}

impl RealtimeConfig {
    /// Use the identity's session token, when it has one, in place of the
    /// configured token.
    pub fn authorized_as(mut self, identity: &Identity) -> Self {
        if let Some(token) = identity.access_token.as_ref().filter(|t| !t.is_empty()) {
            self.access_token = Some(token.clone());
        }
        self
    }

    /// Build the WebSocket URL for Supabase Realtime.
    pub(crate) fn ws_url(&self) -> String {
        format!(
            "wss://{}.supabase.co/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.project_ref, self.api_key
        )
    }
}

// ---------------------------------------------------------------------------
// Phoenix Protocol Types
// ---------------------------------------------------------------------------

/// A Phoenix protocol message envelope (v1 JSON format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
    #[serde(rename = "ref")]
    pub msg_ref: Option<String>,
}

// ---------------------------------------------------------------------------
// Channel Configuration
// ---------------------------------------------------------------------------

/// Configuration for a Supabase Realtime channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub broadcast: BroadcastConfig,
    pub presence: PresenceKeyConfig,
    /// Row-change subscription (`postgres_changes`), if any.
    pub postgres_changes: Option<RowFilter>,
    /// JWT forwarded so row-level security applies to row changes.
    pub access_token: Option<String>,
}

/// Broadcast configuration for a channel.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Whether to receive your own broadcasts (Supabase "self" key).
    pub self_send: bool,
    /// Whether broadcasts are acknowledged by the server.
    pub ack: bool,
}

/// Presence configuration for a channel.
#[derive(Debug, Clone)]
pub struct PresenceKeyConfig {
    /// The key used to identify this client in presence state.
    pub key: String,
}

impl ChannelConfig {
    /// Serialize to the JSON payload expected by Supabase phx_join.
    pub(crate) fn to_join_payload(&self) -> serde_json::Value {
        let postgres_changes: Vec<serde_json::Value> = self
            .postgres_changes
            .iter()
            .map(|f| {
                let mut entry = serde_json::json!({
                    "event": "*",
                    "schema": f.schema,
                    "table": f.table,
                });
                if let Some(filter) = &f.filter {
                    entry["filter"] = serde_json::json!(filter);
                }
                entry
            })
            .collect();

        let mut payload = serde_json::json!({
            "config": {
                "broadcast": {
                    "self": self.broadcast.self_send,
                    "ack": self.broadcast.ack
                },
                "presence": {
                    "key": self.presence.key
                },
                "postgres_changes": postgres_changes
            }
        });
        if let Some(token) = &self.access_token {
            payload["access_token"] = serde_json::json!(token);
        }
        payload
    }
}

// ---------------------------------------------------------------------------
// Events & Commands
// ---------------------------------------------------------------------------

/// Events emitted by the realtime client.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    /// WebSocket connection established.
    Connected,
    /// WebSocket connection lost.
    Disconnected,
    /// The join reply for a channel came back ok.
    ChannelJoined { topic: String },
    /// Channel join refused, closed or errored.
    ChannelError { topic: String, message: String },
    /// A broadcast event received on a channel.
    Broadcast {
        topic: String,
        event: String,
        payload: serde_json::Value,
    },
    /// A row-change notification received on a channel.
    PostgresChange { topic: String, change: RowChange },
    /// Error.
    Error(String),
}

/// Commands sent to the realtime client from the application layer.
#[derive(Debug)]
pub(crate) enum RealtimeCommand {
    JoinChannel {
        topic: String,
        config: ChannelConfig,
    },
    LeaveChannel {
        topic: String,
    },
    Broadcast {
        topic: String,
        event: String,
        payload: serde_json::Value,
    },
    Disconnect,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_config(filter: Option<RowFilter>) -> ChannelConfig {
        ChannelConfig {
            broadcast: BroadcastConfig {
                self_send: false,
                ack: true,
            },
            presence: PresenceKeyConfig {
                key: "user-1".into(),
            },
            postgres_changes: filter,
            access_token: None,
        }
    }

    #[test]
    fn join_payload_without_row_changes() {
        let payload = channel_config(None).to_join_payload();
        assert_eq!(payload["config"]["broadcast"]["self"], false);
        assert_eq!(payload["config"]["broadcast"]["ack"], true);
        assert_eq!(payload["config"]["presence"]["key"], "user-1");
        assert_eq!(payload["config"]["postgres_changes"], serde_json::json!([]));
        assert!(payload.get("access_token").is_none());
    }

    #[test]
    fn join_payload_with_row_filter_and_token() {
        let mut config = channel_config(Some(RowFilter::eq("comments", "post_id", "42")));
        config.access_token = Some("jwt".into());
        let payload = config.to_join_payload();
        let changes = &payload["config"]["postgres_changes"][0];
        assert_eq!(changes["event"], "*");
        assert_eq!(changes["schema"], "public");
        assert_eq!(changes["table"], "comments");
        assert_eq!(changes["filter"], "post_id=eq.42");
        assert_eq!(payload["access_token"], "jwt");
    }

    #[test]
    fn ws_url_contains_project_and_key() {
        let config = RealtimeConfig {
            project_ref: "abcd".into(),
            api_key: "anon".into(),
            ..Default::default()
        };
        assert_eq!(
            config.ws_url(),
            "wss://abcd.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
    }

    #[test]
    fn config_from_settings_drops_empty_token() {
        let settings = RealtimeSettings {
            access_token: Some(String::new()),
            join_timeout_secs: 4,
            ..Default::default()
        };
        let config: RealtimeConfig = settings.into();
        assert!(config.access_token.is_none());
        assert_eq!(config.join_timeout_secs, 4);
        assert!(!format!("{config:?}").contains("anon"));
    }

    #[test]
    fn session_token_overrides_configured_token() {
        let config = RealtimeConfig {
            access_token: Some("service".into()),
            ..Default::default()
        };
        let user = Identity::from_supabase_auth("u1".into(), "Ana".into(), "user-jwt".into());
        let authorized = config.clone().authorized_as(&user);
        assert_eq!(authorized.access_token.as_deref(), Some("user-jwt"));

        let anonymous = config.authorized_as(&Identity::generate("Guest"));
        assert_eq!(anonymous.access_token.as_deref(), Some("service"));
    }
}
