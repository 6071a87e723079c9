//! Typing indicator / presence timing.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceSettings {
    /// Receiver side: a peer without a refresh or stop is evicted after this.
    pub typing_timeout_ms: u64,
    /// Sender side: minimum spacing between `is_active = true` publishes.
    pub debounce_ms: u64,
    /// Sender side: automatic stop after this long without a keystroke.
    pub local_idle_ms: u64,
    /// Drop events whose `emitted_at` is older than the last one seen for the peer.
    pub drop_stale_events: bool,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            typing_timeout_ms: 3000,
            debounce_ms: 1000,
            local_idle_ms: 3000,
            drop_stale_events: true,
        }
    }
}
