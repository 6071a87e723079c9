//! Channel transport abstraction.
//!
//! The core only needs three operations from the realtime service:
//! subscribe to a topic, publish a broadcast on it, and unsubscribe.
//! Delivery status (`subscribed` / `error` / `timed_out`), broadcasts and
//! row-change notifications all arrive in order on the subscription's
//! receiver.
//!
//! Two implementations ship with the crate: [`crate::realtime::RealtimeTransport`]
//! (Supabase Realtime) and [`MemoryTransport`] (in-process loopback).

mod memory;

pub use memory::{MemoryHub, MemoryTransport, PublishedMessage, PUBLISHED_LOG_LIMIT};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Capacity of each per-subscription event queue.
pub(crate) const SUBSCRIPTION_BUFFER: usize = 256;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("not subscribed to topic {0}")]
    NotSubscribed(String),
    #[error("failed to encode payload: {0}")]
    Encode(String),
    #[error("publish failed: {0}")]
    Publish(String),
}

impl From<TransportError> for lounge_common::LoungeError {
    fn from(e: TransportError) -> Self {
        lounge_common::LoungeError::Transport(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Row changes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RowOp {
    Insert,
    Update,
    Delete,
}

/// A single insert/update/delete notification for a table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub op: RowOp,
    pub schema: String,
    pub table: String,
    /// New row image (`null` for deletes).
    #[serde(default)]
    pub record: serde_json::Value,
    /// Previous row image; for deletes usually only the primary key.
    #[serde(default)]
    pub old_record: serde_json::Value,
}

impl RowChange {
    /// The row image that identifies the affected row.
    pub fn identity_record(&self) -> &serde_json::Value {
        match self.op {
            RowOp::Delete => &self.old_record,
            RowOp::Insert | RowOp::Update => &self.record,
        }
    }
}

/// Scopes row-change notifications to one table, optionally filtered by an
/// equality on one column (PostgREST filter syntax `column=eq.value`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    pub schema: String,
    pub table: String,
    pub filter: Option<String>,
}

impl RowFilter {
    pub fn table(table: &str) -> Self {
        Self {
            schema: "public".to_string(),
            table: table.to_string(),
            filter: None,
        }
    }

    pub fn eq(table: &str, column: &str, value: &str) -> Self {
        Self {
            filter: Some(format!("{column}=eq.{value}")),
            ..Self::table(table)
        }
    }

    /// Whether a change falls inside this filter.
    pub fn matches(&self, change: &RowChange) -> bool {
        if change.schema != self.schema || change.table != self.table {
            return false;
        }
        let Some(filter) = &self.filter else {
            return true;
        };
        let Some((column, value)) = filter.split_once("=eq.") else {
            return true;
        };
        match change.identity_record().get(column) {
            Some(serde_json::Value::String(s)) => s == value,
            Some(serde_json::Value::Number(n)) => n.to_string() == value,
            Some(serde_json::Value::Bool(b)) => b.to_string() == value,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribed,
    Error(String),
    TimedOut,
}

/// Everything a subscription can deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    Status(ChannelStatus),
    Broadcast {
        event: String,
        payload: serde_json::Value,
    },
    RowChange(RowChange),
}

#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Also deliver row changes matching this filter.
    pub row_filter: Option<RowFilter>,
}

impl SubscribeOptions {
    pub fn rows(filter: RowFilter) -> Self {
        Self {
            row_filter: Some(filter),
        }
    }
}

/// Receiving half of a topic subscription.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    rx: mpsc::Receiver<ChannelMessage>,
}

impl Subscription {
    pub(crate) fn new(topic: &str, rx: mpsc::Receiver<ChannelMessage>) -> Self {
        Self {
            topic: topic.to_string(),
            rx,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message, or `None` once the topic is unsubscribed.
    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Subscribe to `topic`. Re-subscribing replaces the previous subscription.
    async fn subscribe(
        &self,
        topic: &str,
        options: SubscribeOptions,
    ) -> Result<Subscription, TransportError>;

    /// Broadcast `payload` under `event` to the other subscribers of `topic`.
    async fn publish(
        &self,
        topic: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError>;

    /// Leave `topic`; its subscription receiver is closed.
    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;
}
