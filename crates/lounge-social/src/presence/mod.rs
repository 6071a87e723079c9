//! Ephemeral typing presence.
//!
//! Each conversation owns a [`PresenceRegistry`] of remote peers that are
//! currently typing (evicted after a TTL) and a [`TypingController`] that
//! decides when the local actor's start/stop signals go out on the wire.
//! [`ConversationPresence`] ties both to one transport topic.

mod conversation;
mod registry;
mod typing;
mod types;

pub use conversation::ConversationPresence;
pub use registry::PresenceRegistry;
pub use typing::{TypingController, TypingPhase};
pub use types::{PresenceTiming, TypingSnapshot};
