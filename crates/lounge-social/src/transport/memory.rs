//! In-process loopback transport.
//!
//! A [`MemoryHub`] plays the role of the realtime server; each
//! [`MemoryTransport`] obtained from it is one connected client. Broadcasts
//! are delivered in order to every other client subscribed to the topic
//! (never echoed to the sender), and row changes injected through the hub
//! reach every subscription whose filter matches.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use super::{
    ChannelMessage, ChannelStatus, ChannelTransport, RowChange, RowFilter, SubscribeOptions,
    Subscription, TransportError, SUBSCRIPTION_BUFFER,
};

/// Number of most recent broadcasts the hub keeps for inspection.
pub const PUBLISHED_LOG_LIMIT: usize = 1024;

/// A broadcast recorded by the hub, in publish order.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub client_id: u64,
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
}

struct Subscriber {
    client_id: u64,
    row_filter: Option<RowFilter>,
    tx: mpsc::Sender<ChannelMessage>,
}

#[derive(Default)]
struct HubState {
    /// topic -> subscribers
    topics: HashMap<String, Vec<Subscriber>>,
    /// Most recent broadcasts, oldest first.
    published: VecDeque<PublishedMessage>,
}

/// Shared in-memory "server".
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<RwLock<HubState>>,
    next_client: Arc<AtomicU64>,
    fail_publish: Arc<AtomicBool>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a new client to the hub.
    pub fn connect(&self) -> MemoryTransport {
        MemoryTransport {
            hub: self.clone(),
            client_id: self.next_client.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Make every subsequent publish fail (or succeed again).
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::Relaxed);
    }

    /// The last [`PUBLISHED_LOG_LIMIT`] broadcasts accepted, oldest first.
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.state.read().await.published.iter().cloned().collect()
    }

    /// Broadcasts accepted on `topic` under `event`.
    pub async fn published_on(&self, topic: &str, event: &str) -> Vec<serde_json::Value> {
        self.state
            .read()
            .await
            .published
            .iter()
            .filter(|m| m.topic == topic && m.event == event)
            .map(|m| m.payload.clone())
            .collect()
    }

    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.state
            .read()
            .await
            .topics
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Deliver a row change to every subscription whose filter matches.
    /// Returns the number of subscriptions it reached.
    pub async fn emit_row_change(&self, change: RowChange) -> usize {
        let targets: Vec<mpsc::Sender<ChannelMessage>> = {
            let state = self.state.read().await;
            state
                .topics
                .values()
                .flatten()
                .filter(|s| s.row_filter.as_ref().is_some_and(|f| f.matches(&change)))
                .map(|s| s.tx.clone())
                .collect()
        };
        let mut delivered = 0;
        for tx in targets {
            if tx.send(ChannelMessage::RowChange(change.clone())).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

/// One client connection to a [`MemoryHub`].
#[derive(Clone)]
pub struct MemoryTransport {
    hub: MemoryHub,
    client_id: u64,
}

impl MemoryTransport {
    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    pub fn hub(&self) -> &MemoryHub {
        &self.hub
    }
}

#[async_trait]
impl ChannelTransport for MemoryTransport {
    async fn subscribe(
        &self,
        topic: &str,
        options: SubscribeOptions,
    ) -> Result<Subscription, TransportError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tx.send(ChannelMessage::Status(ChannelStatus::Subscribed))
            .await
            .map_err(|_| TransportError::Closed)?;

        let mut state = self.hub.state.write().await;
        let subscribers = state.topics.entry(topic.to_string()).or_default();
        subscribers.retain(|s| s.client_id != self.client_id);
        subscribers.push(Subscriber {
            client_id: self.client_id,
            row_filter: options.row_filter,
            tx,
        });
        debug!(client = self.client_id, topic = %topic, "Memory subscribe");
        Ok(Subscription::new(topic, rx))
    }

    async fn publish(
        &self,
        topic: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        if self.hub.fail_publish.load(Ordering::Relaxed) {
            return Err(TransportError::Publish("injected failure".to_string()));
        }

        let targets: Vec<mpsc::Sender<ChannelMessage>> = {
            let mut state = self.hub.state.write().await;
            if state.published.len() == PUBLISHED_LOG_LIMIT {
                state.published.pop_front();
            }
            state.published.push_back(PublishedMessage {
                client_id: self.client_id,
                topic: topic.to_string(),
                event: event.to_string(),
                payload: payload.clone(),
            });
            state
                .topics
                .get(topic)
                .map(|subs| {
                    subs.iter()
                        .filter(|s| s.client_id != self.client_id)
                        .map(|s| s.tx.clone())
                        .collect()
                })
                .unwrap_or_default()
        };

        for tx in targets {
            let _ = tx
                .send(ChannelMessage::Broadcast {
                    event: event.to_string(),
                    payload: payload.clone(),
                })
                .await;
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        let mut state = self.hub.state.write().await;
        if let Some(subs) = state.topics.get_mut(topic) {
            subs.retain(|s| s.client_id != self.client_id);
            if subs.is_empty() {
                state.topics.remove(topic);
            }
        }
        debug!(client = self.client_id, topic = %topic, "Memory unsubscribe");
        Ok(())
    }
}
