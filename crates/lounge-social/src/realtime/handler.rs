//! Incoming Phoenix message handler and payload parsing.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::transport::{RowChange, RowOp};

use super::connection::JoinedChannels;
use super::types::{PhoenixMessage, RealtimeEvent};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract the short topic name from a Phoenix topic (strip "realtime:" prefix).
fn strip_topic_prefix(topic: &str) -> &str {
    topic.strip_prefix("realtime:").unwrap_or(topic)
}

/// Parse a `postgres_changes` payload.
///
/// Supabase sends `{ "data": { "type": "INSERT", "schema", "table",
/// "record", "old_record", ... }, "ids": [...] }`.
pub(crate) fn parse_postgres_change(payload: &serde_json::Value) -> Option<RowChange> {
    let data = payload.get("data")?;
    let op = match data.get("type")?.as_str()? {
        "INSERT" => RowOp::Insert,
        "UPDATE" => RowOp::Update,
        "DELETE" => RowOp::Delete,
        _ => return None,
    };
    Some(RowChange {
        op,
        schema: data
            .get("schema")
            .and_then(|s| s.as_str())
            .unwrap_or("public")
            .to_string(),
        table: data.get("table")?.as_str()?.to_string(),
        record: data.get("record").cloned().unwrap_or_default(),
        old_record: data.get("old_record").cloned().unwrap_or_default(),
    })
}

// ---------------------------------------------------------------------------
// Message Handler
// ---------------------------------------------------------------------------

/// Handle a single incoming Phoenix message.
pub(crate) async fn handle_phoenix_message(
    msg: &PhoenixMessage,
    joined_channels: &JoinedChannels,
    event_tx: &mpsc::Sender<RealtimeEvent>,
) {
    let topic = strip_topic_prefix(&msg.topic);

    match msg.event.as_str() {
        "phx_reply" => {
            let is_join_reply = match (&msg.msg_ref, joined_channels.read().await.get(topic)) {
                (Some(r), Some(ch)) => ch.join_ref.as_deref() == Some(r.as_str()),
                _ => false,
            };
            let status = msg
                .payload
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("unknown");

            if status == "ok" {
                if is_join_reply {
                    debug!(topic = %topic, "Channel joined");
                    let _ = event_tx
                        .send(RealtimeEvent::ChannelJoined {
                            topic: topic.to_string(),
                        })
                        .await;
                } else {
                    debug!(topic = %topic, msg_ref = ?msg.msg_ref, "Reply ok");
                }
            } else {
                let message = msg
                    .payload
                    .get("response")
                    .and_then(|r| r.get("reason"))
                    .and_then(|r| r.as_str())
                    .unwrap_or("unknown error")
                    .to_string();
                warn!(
                    topic = %topic,
                    status = %status,
                    join = is_join_reply,
                    "Channel reply error"
                );
                let _ = event_tx
                    .send(RealtimeEvent::ChannelError {
                        topic: topic.to_string(),
                        message,
                    })
                    .await;
            }
        }
        "phx_error" => {
            warn!(topic = %topic, "Channel error");
            let _ = event_tx
                .send(RealtimeEvent::ChannelError {
                    topic: topic.to_string(),
                    message: "Channel error".to_string(),
                })
                .await;
        }
        "phx_close" => {
            info!(topic = %topic, "Channel closed");
            let _ = event_tx
                .send(RealtimeEvent::ChannelError {
                    topic: topic.to_string(),
                    message: "Channel closed".to_string(),
                })
                .await;
        }
        "broadcast" => {
            // Extract the inner event name and payload.
            let inner_event = msg
                .payload
                .get("event")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown")
                .to_string();
            let inner_payload = msg
                .payload
                .get("payload")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            debug!(topic = %topic, event = %inner_event, "Broadcast received");
            let _ = event_tx
                .send(RealtimeEvent::Broadcast {
                    topic: topic.to_string(),
                    event: inner_event,
                    payload: inner_payload,
                })
                .await;
        }
        "postgres_changes" => match parse_postgres_change(&msg.payload) {
            Some(change) => {
                debug!(
                    topic = %topic,
                    table = %change.table,
                    op = ?change.op,
                    "Row change received"
                );
                let _ = event_tx
                    .send(RealtimeEvent::PostgresChange {
                        topic: topic.to_string(),
                        change,
                    })
                    .await;
            }
            None => {
                debug!(topic = %topic, "Malformed postgres_changes payload");
            }
        },
        _ => {
            debug!(
                topic = %topic,
                event = %msg.event,
                "Unhandled Phoenix event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use serde_json::json;
    use tokio::sync::RwLock;

    use super::*;
    use crate::realtime::connection::PendingChannel;
    use crate::realtime::types::{BroadcastConfig, ChannelConfig, PresenceKeyConfig};

    fn joined(topic: &str, join_ref: &str) -> JoinedChannels {
        let mut map = HashMap::new();
        map.insert(
            topic.to_string(),
            PendingChannel {
                config: ChannelConfig {
                    broadcast: BroadcastConfig {
                        self_send: false,
                        ack: true,
                    },
                    presence: PresenceKeyConfig { key: "me".into() },
                    postgres_changes: None,
                    access_token: None,
                },
                join_ref: Some(join_ref.to_string()),
            },
        );
        Arc::new(RwLock::new(map))
    }

    fn phoenix(event: &str, payload: serde_json::Value, msg_ref: Option<&str>) -> PhoenixMessage {
        PhoenixMessage {
            topic: "realtime:typing:c1".into(),
            event: event.into(),
            payload,
            msg_ref: msg_ref.map(String::from),
        }
    }

    #[test]
    fn postgres_change_parsing() {
        let change = parse_postgres_change(&json!({
            "data": {
                "type": "UPDATE",
                "schema": "public",
                "table": "comments",
                "record": {"id": "c1", "body": "edited"},
                "old_record": {"id": "c1"}
            },
            "ids": [1]
        }))
        .unwrap();
        assert_eq!(change.op, RowOp::Update);
        assert_eq!(change.table, "comments");
        assert_eq!(change.record["body"], "edited");

        let truncate = json!({"data": {"type": "TRUNCATE", "table": "x"}});
        assert!(parse_postgres_change(&truncate).is_none());
        assert!(parse_postgres_change(&json!({})).is_none());
    }

    #[tokio::test]
    async fn only_join_reply_marks_joined() {
        let channels = joined("typing:c1", "7");
        let (tx, mut rx) = mpsc::channel(8);

        // A broadcast ack with another ref is not a join.
        handle_phoenix_message(
            &phoenix("phx_reply", json!({"status": "ok", "response": {}}), Some("9")),
            &channels,
            &tx,
        )
        .await;
        assert!(rx.try_recv().is_err());

        handle_phoenix_message(
            &phoenix("phx_reply", json!({"status": "ok", "response": {}}), Some("7")),
            &channels,
            &tx,
        )
        .await;
        match rx.try_recv() {
            Ok(RealtimeEvent::ChannelJoined { topic }) => assert_eq!(topic, "typing:c1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_reply_carries_reason() {
        let channels = joined("typing:c1", "7");
        let (tx, mut rx) = mpsc::channel(8);
        handle_phoenix_message(
            &phoenix(
                "phx_reply",
                json!({"status": "error", "response": {"reason": "unauthorized"}}),
                Some("7"),
            ),
            &channels,
            &tx,
        )
        .await;
        match rx.try_recv() {
            Ok(RealtimeEvent::ChannelError { message, .. }) => assert_eq!(message, "unauthorized"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn broadcast_unwraps_inner_event() {
        let channels = joined("typing:c1", "7");
        let (tx, mut rx) = mpsc::channel(8);
        handle_phoenix_message(
            &phoenix(
                "broadcast",
                json!({"type": "broadcast", "event": "typing", "payload": {"peer_id": "a"}}),
                None,
            ),
            &channels,
            &tx,
        )
        .await;
        match rx.try_recv() {
            Ok(RealtimeEvent::Broadcast {
                topic,
                event,
                payload,
            }) => {
                assert_eq!(topic, "typing:c1");
                assert_eq!(event, "typing");
                assert_eq!(payload["peer_id"], "a");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
