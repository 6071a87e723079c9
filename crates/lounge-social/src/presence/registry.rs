//! Per-conversation map of remote peers that are currently typing.
//!
//! Every live entry owns exactly one eviction timer. Refreshing an entry
//! aborts the old timer before scheduling the new one, and each timer
//! carries the generation it was scheduled for so a timer that already
//! woke up cannot evict a refreshed entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::protocol::PresenceEvent;

use super::types::{PresenceTiming, TypingSnapshot};

struct Entry {
    event: PresenceEvent,
    generation: u64,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    /// Newest `emitted_at` applied per peer, kept across stops and evictions.
    high_water: HashMap<String, u64>,
    next_generation: u64,
}

struct Shared {
    state: Mutex<State>,
    snapshot_tx: watch::Sender<TypingSnapshot>,
    timeout: Duration,
    drop_stale_events: bool,
    local_peer_id: Option<String>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_snapshot(&self, state: &State) {
        let names = state
            .entries
            .values()
            .filter(|e| Some(&e.event.peer_id) != self.local_peer_id.as_ref())
            .map(|e| e.event.display_name.clone())
            .collect();
        let snapshot = TypingSnapshot::from_names(names);
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    /// Timer callback: remove `peer_id` unless it was refreshed since.
    fn evict(&self, peer_id: &str, generation: u64) {
        let mut state = self.lock();
        let current = state.entries.get(peer_id).map(|e| e.generation);
        if current != Some(generation) {
            return;
        }
        state.entries.remove(peer_id);
        debug!(peer_id = %peer_id, "Typing entry expired");
        self.publish_snapshot(&state);
    }
}

/// Remote typing state for one conversation.
///
/// Methods are synchronous; scheduling eviction requires a Tokio runtime.
pub struct PresenceRegistry {
    shared: Arc<Shared>,
}

impl PresenceRegistry {
    pub fn new(timing: &PresenceTiming) -> Self {
        Self::build(timing, None)
    }

    /// Registry whose snapshots never list `local_peer_id`.
    pub fn excluding(timing: &PresenceTiming, local_peer_id: &str) -> Self {
        Self::build(timing, Some(local_peer_id.to_string()))
    }

    fn build(timing: &PresenceTiming, local_peer_id: Option<String>) -> Self {
        let (snapshot_tx, _) = watch::channel(TypingSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                snapshot_tx,
                timeout: timing.typing_timeout,
                drop_stale_events: timing.drop_stale_events,
                local_peer_id,
            }),
        }
    }

    /// Insert or replace the entry for `event.peer_id`.
    ///
    /// An active event (re)arms the peer's eviction timer; an inactive one
    /// removes the peer immediately. Returns `false` if the event was
    /// dropped as stale.
    pub fn upsert(&self, event: PresenceEvent) -> bool {
        let mut state = self.shared.lock();

        if self.shared.drop_stale_events {
            if let Some(&mark) = state.high_water.get(&event.peer_id) {
                if event.emitted_at < mark {
                    debug!(
                        peer_id = %event.peer_id,
                        emitted_at = event.emitted_at,
                        newest = mark,
                        "Dropping stale typing event"
                    );
                    return false;
                }
            }
            state
                .high_water
                .insert(event.peer_id.clone(), event.emitted_at);
        }

        if let Some(old) = state.entries.remove(&event.peer_id) {
            old.timer.abort();
        }

        if event.is_active {
            state.next_generation += 1;
            let generation = state.next_generation;
            let timer = spawn_eviction(
                Arc::downgrade(&self.shared),
                event.peer_id.clone(),
                generation,
                Instant::now() + self.shared.timeout,
            );
            state.entries.insert(
                event.peer_id.clone(),
                Entry {
                    event,
                    generation,
                    timer,
                },
            );
        }

        self.shared.publish_snapshot(&state);
        true
    }

    /// Active entries, optionally without one peer (usually the local actor).
    pub fn list_active(&self, exclude_peer_id: Option<&str>) -> Vec<PresenceEvent> {
        let state = self.shared.lock();
        let mut events: Vec<PresenceEvent> = state
            .entries
            .values()
            .filter(|e| Some(e.event.peer_id.as_str()) != exclude_peer_id)
            .map(|e| e.event.clone())
            .collect();
        events.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        events
    }

    pub fn len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> TypingSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Receiver notified whenever the rendered snapshot changes.
    pub fn watch(&self) -> watch::Receiver<TypingSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Cancel every timer and forget all peers.
    pub fn clear(&self) {
        let mut state = self.shared.lock();
        for (_, entry) in state.entries.drain() {
            entry.timer.abort();
        }
        state.high_water.clear();
        self.shared.publish_snapshot(&state);
    }
}

impl Drop for PresenceRegistry {
    fn drop(&mut self) {
        let state = self.shared.lock();
        for entry in state.entries.values() {
            entry.timer.abort();
        }
    }
}

fn spawn_eviction(
    shared: Weak<Shared>,
    peer_id: String,
    generation: u64,
    deadline: Instant,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        if let Some(shared) = shared.upgrade() {
            shared.evict(&peer_id, generation);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing() -> PresenceTiming {
        PresenceTiming::default()
    }

    fn event(peer: &str, active: bool, emitted_at: u64) -> PresenceEvent {
        PresenceEvent {
            peer_id: peer.into(),
            display_name: peer.to_uppercase(),
            avatar_ref: None,
            is_active: active,
            emitted_at,
        }
    }

    async fn advance_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn active_peer_expires_after_timeout() {
        let registry = PresenceRegistry::new(&timing());
        registry.upsert(event("a", true, 1));

        advance_ms(2999).await;
        assert_eq!(registry.list_active(None).len(), 1);

        advance_ms(2).await;
        assert!(registry.list_active(None).is_empty());
        assert!(!registry.snapshot().is_anyone_typing);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_upsert_keeps_one_entry_and_one_timer() {
        let registry = PresenceRegistry::new(&timing());
        registry.upsert(event("a", true, 1));
        registry.upsert(event("a", true, 1));
        assert_eq!(registry.len(), 1);

        advance_ms(2000).await;
        registry.upsert(event("a", true, 2));

        // The first timer would have fired at 3000.
        advance_ms(1500).await;
        assert_eq!(registry.len(), 1);

        advance_ms(1501).await;
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_removes_immediately() {
        let registry = PresenceRegistry::new(&timing());
        registry.upsert(event("a", true, 1));
        registry.upsert(event("b", true, 1));
        registry.upsert(event("a", false, 2));
        let active = registry.list_active(None);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].peer_id, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn stale_start_after_stop_is_dropped() {
        let registry = PresenceRegistry::new(&timing());
        assert!(registry.upsert(event("a", true, 10)));
        assert!(registry.upsert(event("a", false, 20)));
        assert!(!registry.upsert(event("a", true, 15)));
        assert!(registry.is_empty());

        // Equal timestamps are duplicates, not stale.
        assert!(registry.upsert(event("a", true, 20)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_guard_can_be_disabled() {
        let registry = PresenceRegistry::new(&PresenceTiming {
            drop_stale_events: false,
            ..timing()
        });
        registry.upsert(event("a", false, 20));
        assert!(registry.upsert(event("a", true, 15)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn list_active_can_exclude_local_peer() {
        let registry = PresenceRegistry::excluding(&timing(), "me");
        registry.upsert(event("me", true, 1));
        registry.upsert(event("b", true, 1));
        assert_eq!(registry.list_active(None).len(), 2);
        assert_eq!(registry.list_active(Some("me")).len(), 1);
        assert_eq!(registry.snapshot().typing_user_names, vec!["B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_timers_and_notifies() {
        let registry = PresenceRegistry::new(&timing());
        let mut rx = registry.watch();
        registry.upsert(event("a", true, 1));
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_anyone_typing);

        registry.clear();
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().is_anyone_typing);

        advance_ms(5000).await;
        assert!(registry.is_empty());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_does_not_renotify_unchanged_snapshot() {
        let registry = PresenceRegistry::new(&timing());
        let mut rx = registry.watch();
        registry.upsert(event("a", true, 1));
        rx.borrow_and_update();
        registry.upsert(event("a", true, 2));
        assert!(!rx.has_changed().unwrap());
    }
}
