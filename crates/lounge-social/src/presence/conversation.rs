//! One conversation's typing presence: registry + controller + translator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use lounge_common::ConversationId;

use crate::identity::Identity;
use crate::protocol::{events, PresenceEvent};
use crate::transport::{
    ChannelMessage, ChannelStatus, ChannelTransport, SubscribeOptions, Subscription,
    TransportError,
};

use super::registry::PresenceRegistry;
use super::typing::TypingController;
use super::types::{PresenceTiming, TypingSnapshot};

/// Typing presence for a single open conversation.
///
/// Created when the conversation view opens and torn down when it closes.
/// Nothing here is shared with other conversations.
pub struct ConversationPresence {
    conversation: ConversationId,
    registry: Arc<PresenceRegistry>,
    controller: TypingController,
    translator: JoinHandle<()>,
    torn_down: AtomicBool,
}

impl ConversationPresence {
    /// Subscribe to the conversation's typing topic and start applying
    /// remote events.
    pub async fn join(
        transport: Arc<dyn ChannelTransport>,
        identity: &Identity,
        conversation: ConversationId,
        timing: PresenceTiming,
    ) -> Result<Self, TransportError> {
        let topic = conversation.typing_topic();
        let subscription = transport
            .subscribe(&topic, SubscribeOptions::default())
            .await?;

        let registry = Arc::new(PresenceRegistry::excluding(&timing, &identity.user_id));
        let translator = tokio::spawn(translate_events(
            subscription,
            Arc::clone(&registry),
            identity.user_id.clone(),
        ));
        let controller = TypingController::new(transport, &topic, identity, timing);

        info!(topic = %topic, peer_id = %identity.user_id, "Joined conversation presence");
        Ok(Self {
            conversation,
            registry,
            controller,
            translator,
            torn_down: AtomicBool::new(false),
        })
    }

    pub fn conversation(&self) -> &ConversationId {
        &self.conversation
    }

    /// Local typing signal from the UI.
    pub async fn send_typing(&self, is_typing: bool) {
        self.controller.send_typing(is_typing).await;
    }

    pub fn typing_snapshot(&self) -> TypingSnapshot {
        self.registry.snapshot()
    }

    pub fn watch(&self) -> watch::Receiver<TypingSnapshot> {
        self.registry.watch()
    }

    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    pub fn controller(&self) -> &TypingController {
        &self.controller
    }

    /// Stop applying remote events, cancel every timer, send the final stop
    /// if needed and leave the topic. Idempotent.
    pub async fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.translator.abort();
        self.registry.clear();
        self.controller.teardown().await;
    }
}

impl Drop for ConversationPresence {
    fn drop(&mut self) {
        self.translator.abort();
        self.registry.clear();
    }
}

/// Apply incoming typing broadcasts to the registry until unsubscribed.
async fn translate_events(
    mut subscription: Subscription,
    registry: Arc<PresenceRegistry>,
    local_peer_id: String,
) {
    let topic = subscription.topic().to_string();
    while let Some(message) = subscription.recv().await {
        match message {
            ChannelMessage::Status(ChannelStatus::Subscribed) => {
                debug!(topic = %topic, "Typing channel subscribed");
            }
            ChannelMessage::Status(ChannelStatus::Error(reason)) => {
                warn!(topic = %topic, reason = %reason, "Typing channel error");
            }
            ChannelMessage::Status(ChannelStatus::TimedOut) => {
                warn!(topic = %topic, "Typing channel subscribe timed out");
            }
            ChannelMessage::Broadcast { event, payload } if event == events::TYPING => {
                match PresenceEvent::from_payload(&payload) {
                    Some(ev) if ev.peer_id == local_peer_id => {}
                    Some(ev) => {
                        debug!(
                            topic = %topic,
                            peer_id = %ev.peer_id,
                            is_active = ev.is_active,
                            "Typing event"
                        );
                        registry.upsert(ev);
                    }
                    None => debug!(topic = %topic, "Malformed typing payload"),
                }
            }
            ChannelMessage::Broadcast { event, .. } => {
                debug!(topic = %topic, event = %event, "Unhandled broadcast event");
            }
            ChannelMessage::RowChange(_) => {}
        }
    }
    debug!(topic = %topic, "Typing subscription closed");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::transport::MemoryHub;

    async fn settle() {
        // Let the translator task drain its queue.
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    async fn join(hub: &MemoryHub, id: &str, name: &str) -> ConversationPresence {
        let identity = Identity::from_supabase_auth(id.into(), name.into(), "jwt".into());
        ConversationPresence::join(
            Arc::new(hub.connect()),
            &identity,
            ConversationId::new("c1"),
            PresenceTiming::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn remote_typing_shows_up_in_snapshot() {
        let hub = MemoryHub::new();
        let alice = join(&hub, "a", "Alice").await;
        let bob = join(&hub, "b", "Bob").await;

        alice.send_typing(true).await;
        settle().await;
        assert_eq!(bob.typing_snapshot().typing_user_names, vec!["Alice"]);
        assert!(!alice.typing_snapshot().is_anyone_typing);

        alice.send_typing(false).await;
        settle().await;
        assert!(!bob.typing_snapshot().is_anyone_typing);
    }

    #[tokio::test(start_paused = true)]
    async fn own_and_malformed_events_are_ignored() {
        let hub = MemoryHub::new();
        let bob = join(&hub, "b", "Bob").await;
        let other = hub.connect();
        other
            .publish(
                "typing:c1",
                events::TYPING,
                json!({"peer_id": "b", "display_name": "Bob", "is_active": true, "emitted_at": 1}),
            )
            .await
            .unwrap();
        other
            .publish("typing:c1", events::TYPING, json!({"garbage": true}))
            .await
            .unwrap();
        settle().await;
        assert!(bob.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_clears_and_unsubscribes() {
        let hub = MemoryHub::new();
        let alice = join(&hub, "a", "Alice").await;
        let bob = join(&hub, "b", "Bob").await;
        bob.send_typing(true).await;
        settle().await;
        assert!(alice.typing_snapshot().is_anyone_typing);

        alice.teardown().await;
        alice.teardown().await;
        assert!(!alice.typing_snapshot().is_anyone_typing);
        assert_eq!(hub.subscriber_count("typing:c1").await, 1);

        bob.teardown().await;
        settle().await;
        assert_eq!(hub.subscriber_count("typing:c1").await, 0);
        let stops = hub
            .published_on("typing:c1", events::TYPING)
            .await
            .into_iter()
            .filter(|p| p["is_active"] == false)
            .count();
        assert_eq!(stops, 1);
    }
}
