//! Timing configuration and UI-facing snapshot types.

use std::time::Duration;

use lounge_config::PresenceSettings;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceTiming {
    /// Receiver side: evict a peer this long after its last start.
    pub typing_timeout: Duration,
    /// Sender side: minimum spacing between `is_active = true` publishes.
    pub debounce: Duration,
    /// Sender side: automatic stop after this long without a start signal.
    pub local_idle: Duration,
    /// Drop events older than the newest one already applied for the peer.
    pub drop_stale_events: bool,
}

impl Default for PresenceTiming {
    fn default() -> Self {
        Self::from(&PresenceSettings::default())
    }
}

impl From<&PresenceSettings> for PresenceTiming {
    fn from(s: &PresenceSettings) -> Self {
        Self {
            typing_timeout: Duration::from_millis(s.typing_timeout_ms),
            debounce: Duration::from_millis(s.debounce_ms),
            local_idle: Duration::from_millis(s.local_idle_ms),
            drop_stale_events: s.drop_stale_events,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// What the UI renders for a conversation's typing indicator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingSnapshot {
    pub typing_user_names: Vec<String>,
    pub is_anyone_typing: bool,
}

impl TypingSnapshot {
    pub(crate) fn from_names(mut names: Vec<String>) -> Self {
        names.sort();
        Self {
            is_anyone_typing: !names.is_empty(),
            typing_user_names: names,
        }
    }
}
