//! Thin Supabase Realtime client over Phoenix Channels v1 protocol.
//!
//! Provides a WebSocket client for Supabase Realtime using
//! `tokio-tungstenite`. Handles heartbeats, channel join/leave, broadcast,
//! row-change (`postgres_changes`) subscriptions and auto-reconnect with
//! backoff. [`RealtimeTransport`] adapts it to
//! [`crate::transport::ChannelTransport`].

mod client;
mod connection;
mod handler;
mod transport;
mod types;

pub use client::RealtimeClient;
pub use transport::RealtimeTransport;
pub use types::{
    BroadcastConfig, ChannelConfig, PhoenixMessage, PresenceKeyConfig, RealtimeConfig,
    RealtimeEvent,
};
