//! [`ChannelTransport`] over a [`RealtimeClient`].
//!
//! The client emits one stream of events for every joined channel; a
//! router task fans them out to the per-topic subscriptions and turns
//! join replies, channel errors and missing replies into
//! [`ChannelStatus`] updates.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::identity::Identity;
use crate::transport::{
    ChannelMessage, ChannelStatus, ChannelTransport, SubscribeOptions, Subscription,
    TransportError, SUBSCRIPTION_BUFFER,
};

use super::client::RealtimeClient;
use super::types::{
    BroadcastConfig, ChannelConfig, PresenceKeyConfig, RealtimeConfig, RealtimeEvent,
};

type Routes = Arc<RwLock<HashMap<String, mpsc::Sender<ChannelMessage>>>>;
type Joined = Arc<RwLock<HashSet<String>>>;

/// Supabase Realtime implementation of [`ChannelTransport`].
pub struct RealtimeTransport {
    client: RealtimeClient,
    routes: Routes,
    joined: Joined,
    presence_key: String,
    access_token: Option<String>,
    join_timeout: Duration,
    router: JoinHandle<()>,
}

impl RealtimeTransport {
    /// Open the connection and start routing events.
    ///
    /// `presence_key` identifies this client in channel presence state
    /// (normally the user id).
    pub fn connect(config: RealtimeConfig, presence_key: &str) -> Self {
        let join_timeout = Duration::from_secs(config.join_timeout_secs);
        let access_token = config.access_token.clone();
        let (client, events) = RealtimeClient::connect(config);
        Self::with_client(client, events, presence_key, access_token, join_timeout)
    }

    /// Connect on behalf of `identity`: its user id is the presence key and
    /// its session token, if any, authorizes channel joins.
    pub fn connect_as(config: RealtimeConfig, identity: &Identity) -> Self {
        Self::connect(config.authorized_as(identity), &identity.user_id)
    }

    fn with_client(
        client: RealtimeClient,
        events: mpsc::Receiver<RealtimeEvent>,
        presence_key: &str,
        access_token: Option<String>,
        join_timeout: Duration,
    ) -> Self {
        let routes: Routes = Arc::new(RwLock::new(HashMap::new()));
        let joined: Joined = Arc::new(RwLock::new(HashSet::new()));
        let router = tokio::spawn(route_events(
            events,
            Arc::clone(&routes),
            Arc::clone(&joined),
        ));

        Self {
            client,
            routes,
            joined,
            presence_key: presence_key.to_string(),
            access_token,
            join_timeout,
            router,
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.client.is_connected().await
    }

    /// Leave every channel and close the socket.
    pub async fn disconnect(&self) {
        self.client.disconnect().await;
        self.routes.write().await.clear();
        self.joined.write().await.clear();
    }
}

impl Drop for RealtimeTransport {
    fn drop(&mut self) {
        self.router.abort();
    }
}

/// Report `TimedOut` on `topic` unless its join reply arrives within
/// `timeout`. Holds only a weak sender so unsubscribing closes the
/// subscription right away.
fn watch_join(
    joined: Joined,
    topic: String,
    tx: mpsc::WeakSender<ChannelMessage>,
    timeout: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if joined.read().await.contains(&topic) {
            return;
        }
        if let Some(tx) = tx.upgrade() {
            warn!(topic = %topic, "Channel join timed out");
            let _ = tx.send(ChannelMessage::Status(ChannelStatus::TimedOut)).await;
        }
    });
}

#[async_trait]
impl ChannelTransport for RealtimeTransport {
    async fn subscribe(
        &self,
        topic: &str,
        options: SubscribeOptions,
    ) -> Result<Subscription, TransportError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let weak_tx = tx.downgrade();
        self.joined.write().await.remove(topic);
        self.routes.write().await.insert(topic.to_string(), tx);

        let config = ChannelConfig {
            broadcast: BroadcastConfig {
                self_send: false,
                ack: true,
            },
            presence: PresenceKeyConfig {
                key: self.presence_key.clone(),
            },
            postgres_changes: options.row_filter,
            access_token: self.access_token.clone(),
        };
        if let Err(e) = self.client.join_channel(topic, config).await {
            self.routes.write().await.remove(topic);
            return Err(e);
        }

        watch_join(
            Arc::clone(&self.joined),
            topic.to_string(),
            weak_tx,
            self.join_timeout,
        );

        info!(topic = %topic, "Subscribing");
        Ok(Subscription::new(topic, rx))
    }

    async fn publish(
        &self,
        topic: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        if !self.routes.read().await.contains_key(topic) {
            return Err(TransportError::NotSubscribed(topic.to_string()));
        }
        self.client.broadcast(topic, event, payload).await
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.routes.write().await.remove(topic);
        self.joined.write().await.remove(topic);
        self.client.leave_channel(topic).await
    }
}

/// Fan client events out to the per-topic subscriptions.
async fn route_events(
    mut events: mpsc::Receiver<RealtimeEvent>,
    routes: Routes,
    joined: Joined,
) {
    while let Some(event) = events.recv().await {
        let (topic, message) = match event {
            RealtimeEvent::ChannelJoined { topic } => {
                joined.write().await.insert(topic.clone());
                (topic, ChannelMessage::Status(ChannelStatus::Subscribed))
            }
            RealtimeEvent::ChannelError { topic, message } => {
                (topic, ChannelMessage::Status(ChannelStatus::Error(message)))
            }
            RealtimeEvent::Broadcast {
                topic,
                event,
                payload,
            } => (topic, ChannelMessage::Broadcast { event, payload }),
            RealtimeEvent::PostgresChange { topic, change } => {
                (topic, ChannelMessage::RowChange(change))
            }
            RealtimeEvent::Disconnected => {
                // Channels are rejoined on reconnect; each reports subscribed again.
                joined.write().await.clear();
                let senders: Vec<_> = routes.read().await.values().cloned().collect();
                for tx in senders {
                    let _ = tx
                        .send(ChannelMessage::Status(ChannelStatus::Error(
                            "disconnected".to_string(),
                        )))
                        .await;
                }
                continue;
            }
            RealtimeEvent::Connected => {
                info!("Realtime connected");
                continue;
            }
            RealtimeEvent::Error(message) => {
                warn!(error = %message, "Realtime error");
                continue;
            }
        };

        let tx = routes.read().await.get(&topic).cloned();
        match tx {
            Some(tx) => {
                if tx.send(message).await.is_err() {
                    debug!(topic = %topic, "Subscription dropped");
                    routes.write().await.remove(&topic);
                }
            }
            None => debug!(topic = %topic, "Event for unknown topic"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::types::RealtimeCommand;
    use crate::transport::{RowChange, RowOp};
    use serde_json::json;
    use tokio::time::Instant;

    const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

    /// A transport over a client with no socket. Keep the command receiver
    /// alive for as long as the transport is used.
    fn offline_transport() -> (
        RealtimeTransport,
        mpsc::Sender<RealtimeEvent>,
        mpsc::Receiver<RealtimeCommand>,
    ) {
        let (client, commands) = RealtimeClient::detached();
        let (event_tx, event_rx) = mpsc::channel(16);
        let transport = RealtimeTransport::with_client(client, event_rx, "me", None, JOIN_TIMEOUT);
        (transport, event_tx, commands)
    }

    async fn routed() -> (mpsc::Sender<RealtimeEvent>, mpsc::Receiver<ChannelMessage>, Joined) {
        let (event_tx, event_rx) = mpsc::channel(16);
        let (sub_tx, sub_rx) = mpsc::channel(16);
        let routes: Routes = Arc::new(RwLock::new(HashMap::new()));
        routes.write().await.insert("typing:c1".into(), sub_tx);
        let joined: Joined = Arc::new(RwLock::new(HashSet::new()));
        tokio::spawn(route_events(event_rx, routes, Arc::clone(&joined)));
        (event_tx, sub_rx, joined)
    }

    #[tokio::test]
    async fn join_reply_becomes_subscribed_status() {
        let (tx, mut rx, joined) = routed().await;
        tx.send(RealtimeEvent::ChannelJoined {
            topic: "typing:c1".into(),
        })
        .await
        .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(ChannelMessage::Status(ChannelStatus::Subscribed))
        );
        assert!(joined.read().await.contains("typing:c1"));
    }

    #[tokio::test]
    async fn events_are_routed_by_topic() {
        let (tx, mut rx, _) = routed().await;
        tx.send(RealtimeEvent::Broadcast {
            topic: "other".into(),
            event: "typing".into(),
            payload: json!({}),
        })
        .await
        .unwrap();
        tx.send(RealtimeEvent::PostgresChange {
            topic: "typing:c1".into(),
            change: RowChange {
                op: RowOp::Insert,
                schema: "public".into(),
                table: "comments".into(),
                record: json!({"id": 1}),
                old_record: json!(null),
            },
        })
        .await
        .unwrap();
        match rx.recv().await {
            Some(ChannelMessage::RowChange(change)) => assert_eq!(change.table, "comments"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_reports_error_and_clears_joined() {
        let (tx, mut rx, joined) = routed().await;
        tx.send(RealtimeEvent::ChannelJoined {
            topic: "typing:c1".into(),
        })
        .await
        .unwrap();
        rx.recv().await;
        tx.send(RealtimeEvent::Disconnected).await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(ChannelMessage::Status(ChannelStatus::Error(
                "disconnected".into()
            )))
        );
        assert!(joined.read().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_join_reply_reports_timed_out() {
        let (transport, _events, _commands) = offline_transport();
        let start = Instant::now();
        let mut sub = transport
            .subscribe("typing:c1", SubscribeOptions::default())
            .await
            .unwrap();

        assert_eq!(
            sub.recv().await,
            Some(ChannelMessage::Status(ChannelStatus::TimedOut))
        );
        assert!(start.elapsed() >= JOIN_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn joined_channel_never_times_out() {
        let (transport, events, mut commands) = offline_transport();
        let mut sub = transport
            .subscribe("typing:c1", SubscribeOptions::default())
            .await
            .unwrap();
        assert!(matches!(
            commands.recv().await,
            Some(RealtimeCommand::JoinChannel { .. })
        ));

        events
            .send(RealtimeEvent::ChannelJoined {
                topic: "typing:c1".into(),
            })
            .await
            .unwrap();
        assert_eq!(
            sub.recv().await,
            Some(ChannelMessage::Status(ChannelStatus::Subscribed))
        );
        let later = tokio::time::timeout(JOIN_TIMEOUT * 3, sub.recv()).await;
        assert!(later.is_err(), "unexpected {later:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_closes_subscription_immediately() {
        let (transport, _events, _commands) = offline_transport();
        let start = Instant::now();
        let mut sub = transport
            .subscribe("typing:c1", SubscribeOptions::default())
            .await
            .unwrap();

        transport.unsubscribe("typing:c1").await.unwrap();
        assert_eq!(sub.recv().await, None);
        assert!(start.elapsed() < JOIN_TIMEOUT);
    }

    #[tokio::test]
    async fn publish_requires_subscription() {
        let (transport, _events, _commands) = offline_transport();
        assert_eq!(
            transport.publish("typing:c1", "typing", json!({})).await,
            Err(TransportError::NotSubscribed("typing:c1".into()))
        );
    }
}
