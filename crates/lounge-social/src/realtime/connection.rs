//! Background WebSocket connection loop with auto-reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::handler::handle_phoenix_message;
use super::types::{ChannelConfig, PhoenixMessage, RealtimeCommand, RealtimeConfig, RealtimeEvent};

// ---------------------------------------------------------------------------
// Ref Counter
// ---------------------------------------------------------------------------

/// Monotonically increasing ref counter for Phoenix messages.
static REF_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_ref() -> String {
    REF_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

/// State for channels that should be (re)joined on reconnect.
#[derive(Clone)]
pub(crate) struct PendingChannel {
    pub(crate) config: ChannelConfig,
    /// Ref of the most recent phx_join; only its reply marks the channel joined.
    pub(crate) join_ref: Option<String>,
}

pub(crate) type JoinedChannels = Arc<RwLock<HashMap<String, PendingChannel>>>;

/// Serialize and write one Phoenix message under `msg_ref`.
async fn write_phoenix<S>(
    writer: &Mutex<S>,
    topic: &str,
    event: &str,
    payload: serde_json::Value,
    msg_ref: String,
) -> bool
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let msg = PhoenixMessage {
        topic: format!("realtime:{topic}"),
        event: event.to_string(),
        payload,
        msg_ref: Some(msg_ref),
    };
    let Ok(json) = serde_json::to_string(&msg) else {
        return false;
    };
    let mut writer = writer.lock().await;
    writer.send(WsMessage::Text(json.into())).await.is_ok()
}

/// Write one Phoenix message under a fresh ref. Returns whether it was sent.
async fn send_phoenix<S>(
    writer: &Mutex<S>,
    topic: &str,
    event: &str,
    payload: serde_json::Value,
) -> bool
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    write_phoenix(writer, topic, event, payload, next_ref()).await
}

/// Register `join_ref` for `topic`, then write its phx_join. The reply can
/// be handled before the write returns, so the ref must be in place first.
async fn join_channel<S>(
    writer: &Mutex<S>,
    channels: &JoinedChannels,
    topic: &str,
    config: ChannelConfig,
) where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let join_ref = next_ref();
    let payload = config.to_join_payload();
    channels.write().await.insert(
        topic.to_string(),
        PendingChannel {
            config,
            join_ref: Some(join_ref.clone()),
        },
    );
    if !write_phoenix(writer, topic, "phx_join", payload, join_ref).await {
        warn!(topic = %topic, "phx_join could not be written");
    }
}

/// Rejoin every known channel on a fresh socket under new join refs.
async fn rejoin_channels<S>(writer: &Mutex<S>, channels: &JoinedChannels)
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let joins: Vec<(String, serde_json::Value, String)> = {
        let mut channels = channels.write().await;
        channels
            .iter_mut()
            .map(|(topic, pending)| {
                let join_ref = next_ref();
                pending.join_ref = Some(join_ref.clone());
                (topic.clone(), pending.config.to_join_payload(), join_ref)
            })
            .collect()
    };
    for (topic, payload, join_ref) in joins {
        debug!(topic = %topic, "Rejoining channel");
        if !write_phoenix(writer, &topic, "phx_join", payload, join_ref).await {
            warn!(topic = %topic, "phx_join could not be written");
        }
    }
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Background task managing the WebSocket connection with auto-reconnect.
pub(crate) async fn connection_loop(
    config: RealtimeConfig,
    connected: Arc<RwLock<bool>>,
    event_tx: mpsc::Sender<RealtimeEvent>,
    command_rx: mpsc::Receiver<RealtimeCommand>,
) {
    let command_rx = Arc::new(Mutex::new(command_rx));
    // Channels to rejoin on reconnect.
    let joined_channels: JoinedChannels = Arc::new(RwLock::new(HashMap::new()));
    let mut reconnect_delay = config.reconnect_delay_secs;

    loop {
        let url = config.ws_url();
        info!(url = %url.split('?').next().unwrap_or(""), "Connecting to Supabase Realtime");

        match tokio::time::timeout(
            Duration::from_secs(15),
            tokio_tungstenite::connect_async(&url),
        )
        .await
        {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;
                *connected.write().await = true;
                let _ = event_tx.send(RealtimeEvent::Connected).await;

                let (ws_write, ws_read) = ws_stream.split();
                let ws_write = Arc::new(Mutex::new(ws_write));

                rejoin_channels(&ws_write, &joined_channels).await;

                let heartbeat_handle = tokio::spawn(heartbeat_task(
                    Arc::clone(&ws_write),
                    config.heartbeat_interval_secs,
                ));

                let cmd_handle = tokio::spawn(command_forwarder(
                    Arc::clone(&command_rx),
                    Arc::clone(&ws_write),
                    Arc::clone(&joined_channels),
                    event_tx.clone(),
                ));

                // Process incoming messages.
                let mut read_stream = ws_read;
                while let Some(msg_result) = read_stream.next().await {
                    match msg_result {
                        Ok(WsMessage::Text(text)) => {
                            if let Ok(phoenix_msg) = serde_json::from_str::<PhoenixMessage>(&text)
                            {
                                handle_phoenix_message(&phoenix_msg, &joined_channels, &event_tx)
                                    .await;
                            } else {
                                debug!(text = %text, "Unrecognized message from Supabase");
                            }
                        }
                        Ok(WsMessage::Close(_)) => {
                            info!("Supabase Realtime closed connection");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }
                        _ => {}
                    }
                }

                // Cleanup.
                heartbeat_handle.abort();
                let forwarder_finished = cmd_handle.is_finished();
                cmd_handle.abort();
                *connected.write().await = false;
                let _ = event_tx.send(RealtimeEvent::Disconnected).await;

                // The forwarder only returns on its own after an explicit disconnect.
                if forwarder_finished {
                    info!("Realtime client disconnected");
                    return;
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to Supabase Realtime");
                let _ = event_tx
                    .send(RealtimeEvent::Error(format!("Connection failed: {e}")))
                    .await;
            }
            Err(_elapsed) => {
                error!("WebSocket connection timed out after 15s");
                let _ = event_tx
                    .send(RealtimeEvent::Error(
                        "Connection timed out after 15s".to_string(),
                    ))
                    .await;
            }
        }

        if event_tx.is_closed() {
            return;
        }

        // Exponential backoff reconnect.
        info!(
            delay = reconnect_delay,
            "Reconnecting in {} seconds", reconnect_delay
        );
        tokio::time::sleep(Duration::from_secs(reconnect_delay)).await;
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs);
    }
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

async fn heartbeat_task<S>(ws_write: Arc<Mutex<S>>, interval_secs: u64)
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        let msg = PhoenixMessage {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: serde_json::json!({}),
            msg_ref: Some(next_ref()),
        };
        if let Ok(json) = serde_json::to_string(&msg) {
            let mut writer = ws_write.lock().await;
            if writer.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Command Forwarder
// ---------------------------------------------------------------------------

async fn command_forwarder<S>(
    cmd_rx: Arc<Mutex<mpsc::Receiver<RealtimeCommand>>>,
    cmd_write: Arc<Mutex<S>>,
    cmd_channels: JoinedChannels,
    cmd_event_tx: mpsc::Sender<RealtimeEvent>,
) where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut rx = cmd_rx.lock().await;
    while let Some(cmd) = rx.recv().await {
        match cmd {
            RealtimeCommand::JoinChannel { topic, config } => {
                join_channel(&cmd_write, &cmd_channels, &topic, config).await;
            }
            RealtimeCommand::LeaveChannel { topic } => {
                send_phoenix(&cmd_write, &topic, "phx_leave", serde_json::json!({})).await;
                cmd_channels.write().await.remove(&topic);
            }
            RealtimeCommand::Broadcast {
                topic,
                event,
                payload,
            } => {
                let sent = send_phoenix(
                    &cmd_write,
                    &topic,
                    "broadcast",
                    serde_json::json!({
                        "type": "broadcast",
                        "event": event,
                        "payload": payload
                    }),
                )
                .await;
                if !sent {
                    warn!(topic = %topic, event = %event, "Broadcast could not be written");
                    let _ = cmd_event_tx
                        .send(RealtimeEvent::ChannelError {
                            topic,
                            message: format!("broadcast {event} not sent"),
                        })
                        .await;
                }
            }
            RealtimeCommand::Disconnect => {
                // Send phx_leave for all channels, then close.
                let topics: Vec<String> = cmd_channels
                    .write()
                    .await
                    .drain()
                    .map(|(topic, _)| topic)
                    .collect();
                for topic in topics {
                    send_phoenix(&cmd_write, &topic, "phx_leave", serde_json::json!({})).await;
                }
                let mut writer = cmd_write.lock().await;
                let _ = writer.send(WsMessage::Close(None)).await;
                return; // Exit the command forwarder
            }
        }
    }
}
