//! Local typing signal -> debounced start/stop broadcasts.
//!
//! Start signals are keystroke-driven and rate limited to one
//! `is_active = true` publish per debounce window. Stops go out
//! immediately. A final stop is always sent on teardown if peers were last
//! told we are typing.

use std::sync::{Arc, Weak};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use lounge_common::now_millis;

use crate::identity::Identity;
use crate::protocol::{events, PresenceEvent};
use crate::transport::{ChannelTransport, TransportError};

use super::types::PresenceTiming;

/// Where the local actor is in the start/stop cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingPhase {
    Idle,
    /// A start is scheduled for the end of the current debounce window.
    PendingSend,
    /// Peers were last told we are typing.
    Sent,
}

#[derive(Default)]
struct ControllerState {
    wants_typing: bool,
    published_active: bool,
    /// When the last `is_active = true` publish went out.
    last_sent_at: Option<Instant>,
    last_emitted_at: u64,
    pending: Option<JoinHandle<()>>,
    pending_generation: u64,
    idle_timer: Option<JoinHandle<()>>,
    idle_generation: u64,
    torn_down: bool,
}

impl ControllerState {
    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    fn cancel_idle(&mut self) {
        if let Some(handle) = self.idle_timer.take() {
            handle.abort();
        }
    }

    fn next_emitted_at(&mut self) -> u64 {
        self.last_emitted_at = now_millis().max(self.last_emitted_at + 1);
        self.last_emitted_at
    }
}

struct Inner {
    transport: Arc<dyn ChannelTransport>,
    topic: String,
    peer_id: String,
    display_name: String,
    avatar_ref: Option<String>,
    timing: PresenceTiming,
    // Held across publishes so events leave in the order they were decided.
    state: Mutex<ControllerState>,
}

impl Inner {
    async fn publish(
        &self,
        state: &mut ControllerState,
        is_active: bool,
    ) -> Result<(), TransportError> {
        let event = PresenceEvent {
            peer_id: self.peer_id.clone(),
            display_name: self.display_name.clone(),
            avatar_ref: self.avatar_ref.clone(),
            is_active,
            emitted_at: state.next_emitted_at(),
        };
        if is_active {
            state.published_active = true;
            state.last_sent_at = Some(Instant::now());
        } else {
            state.published_active = false;
        }
        let payload =
            serde_json::to_value(&event).map_err(|e| TransportError::Encode(e.to_string()))?;
        self.transport
            .publish(&self.topic, events::TYPING, payload)
            .await
    }

    /// Publish and log failures; dropped typing events self-heal.
    async fn publish_logged(&self, state: &mut ControllerState, is_active: bool) {
        if let Err(e) = self.publish(state, is_active).await {
            warn!(topic = %self.topic, is_active, error = %e, "Typing publish failed");
        }
    }

    async fn fire_pending(&self, generation: u64) {
        let mut state = self.state.lock().await;
        if state.torn_down || state.pending_generation != generation || state.pending.is_none() {
            return;
        }
        state.pending = None;
        if !state.wants_typing {
            return;
        }
        debug!(topic = %self.topic, "Debounced typing start");
        self.publish_logged(&mut state, true).await;
    }

    async fn fire_idle(&self, generation: u64) {
        let mut state = self.state.lock().await;
        if state.torn_down || state.idle_generation != generation || state.idle_timer.is_none() {
            return;
        }
        state.idle_timer = None;
        state.wants_typing = false;
        state.cancel_pending();
        if state.published_active {
            debug!(topic = %self.topic, "Local typing idle, sending stop");
            self.publish_logged(&mut state, false).await;
        }
    }
}

/// Sender side of a conversation's typing indicator.
pub struct TypingController {
    inner: Arc<Inner>,
}

impl TypingController {
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        topic: &str,
        identity: &Identity,
        timing: PresenceTiming,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                topic: topic.to_string(),
                peer_id: identity.user_id.clone(),
                display_name: identity.display_name.clone(),
                avatar_ref: identity.avatar_ref.clone(),
                timing,
                state: Mutex::new(ControllerState::default()),
            }),
        }
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// Feed the local typing state. Never fails; publish errors are logged.
    pub async fn send_typing(&self, is_typing: bool) {
        let mut state = self.inner.state.lock().await;
        if state.torn_down {
            return;
        }

        if !is_typing {
            state.wants_typing = false;
            state.cancel_pending();
            state.cancel_idle();
            if state.published_active {
                self.inner.publish_logged(&mut state, false).await;
            }
            return;
        }

        state.wants_typing = true;
        self.rearm_idle(&mut state);

        if state.pending.is_some() {
            return;
        }
        let since_last = state.last_sent_at.map(|at| at.elapsed());
        match since_last {
            Some(elapsed) if elapsed < self.inner.timing.debounce => {
                // Already shown as typing: the next keystroke after the
                // window refreshes it.
                if !state.published_active {
                    self.schedule_pending(&mut state, self.inner.timing.debounce - elapsed);
                }
            }
            _ => self.inner.publish_logged(&mut state, true).await,
        }
    }

    pub async fn phase(&self) -> TypingPhase {
        let state = self.inner.state.lock().await;
        if state.pending.is_some() {
            TypingPhase::PendingSend
        } else if state.published_active {
            TypingPhase::Sent
        } else {
            TypingPhase::Idle
        }
    }

    /// Cancel timers, send a final stop if peers think we are typing, and
    /// leave the topic. Idempotent.
    pub async fn teardown(&self) {
        let mut state = self.inner.state.lock().await;
        if state.torn_down {
            return;
        }
        state.torn_down = true;
        state.wants_typing = false;
        state.cancel_pending();
        state.cancel_idle();

        if state.published_active {
            if let Err(e) = self.inner.publish(&mut state, false).await {
                debug!(topic = %self.inner.topic, error = %e, "Final typing stop not sent");
            }
        }
        drop(state);

        if let Err(e) = self.inner.transport.unsubscribe(&self.inner.topic).await {
            debug!(topic = %self.inner.topic, error = %e, "Unsubscribe at teardown failed");
        }
        info!(topic = %self.inner.topic, "Typing controller torn down");
    }

    fn schedule_pending(&self, state: &mut ControllerState, delay: std::time::Duration) {
        state.pending_generation += 1;
        let generation = state.pending_generation;
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let deadline = Instant::now() + delay;
        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = inner.upgrade() {
                inner.fire_pending(generation).await;
            }
        }));
    }

    fn rearm_idle(&self, state: &mut ControllerState) {
        state.cancel_idle();
        state.idle_generation += 1;
        let generation = state.idle_generation;
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let deadline = Instant::now() + self.inner.timing.local_idle;
        state.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = inner.upgrade() {
                inner.fire_idle(generation).await;
            }
        }));
    }
}

impl Drop for TypingController {
    fn drop(&mut self) {
        if let Ok(mut state) = self.inner.state.try_lock() {
            state.cancel_pending();
            state.cancel_idle();
        }
    }
}
