//! Public handle for interacting with the Supabase Realtime connection.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::transport::TransportError;

use super::connection::connection_loop;
use super::types::{ChannelConfig, RealtimeCommand, RealtimeConfig, RealtimeEvent};

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Handle for interacting with the Supabase Realtime connection.
///
/// All methods are non-blocking and send commands to the background
/// connection task. They fail only once that task has exited.
pub struct RealtimeClient {
    command_tx: mpsc::Sender<RealtimeCommand>,
    connected: Arc<RwLock<bool>>,
}

impl RealtimeClient {
    /// Create a new client and start the background connection.
    /// Returns `(client, event_receiver)`.
    pub fn connect(config: RealtimeConfig) -> (Self, mpsc::Receiver<RealtimeEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);
        let connected = Arc::new(RwLock::new(false));

        let client = Self {
            command_tx,
            connected: Arc::clone(&connected),
        };

        tokio::spawn(connection_loop(config, connected, event_tx, command_rx));

        (client, event_rx)
    }

    /// A client with no connection task behind it; commands land on the
    /// returned receiver.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::Receiver<RealtimeCommand>) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let client = Self {
            command_tx,
            connected: Arc::new(RwLock::new(false)),
        };
        (client, command_rx)
    }

    async fn send(&self, command: RealtimeCommand) -> Result<(), TransportError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Join a Supabase Realtime channel.
    pub async fn join_channel(
        &self,
        topic: &str,
        config: ChannelConfig,
    ) -> Result<(), TransportError> {
        self.send(RealtimeCommand::JoinChannel {
            topic: topic.to_string(),
            config,
        })
        .await
    }

    /// Leave a channel.
    pub async fn leave_channel(&self, topic: &str) -> Result<(), TransportError> {
        self.send(RealtimeCommand::LeaveChannel {
            topic: topic.to_string(),
        })
        .await
    }

    /// Send a broadcast event on a channel.
    pub async fn broadcast(
        &self,
        topic: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        self.send(RealtimeCommand::Broadcast {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
        })
        .await
    }

    /// Check if connected.
    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    /// Disconnect from the server.
    pub async fn disconnect(&self) {
        let _ = self.command_tx.send(RealtimeCommand::Disconnect).await;
    }
}
