pub mod identity;
pub mod presence;
pub mod protocol;
pub mod realtime;
pub mod reconcile;
pub mod rows;
pub mod transport;

pub use identity::Identity;
pub use presence::{
    ConversationPresence, PresenceRegistry, PresenceTiming, TypingController, TypingPhase,
    TypingSnapshot,
};
pub use protocol::PresenceEvent;
pub use realtime::{RealtimeClient, RealtimeConfig, RealtimeTransport};
pub use reconcile::{
    CounterStore, MemoryCounterStore, PostgrestCounterStore, ReconcileError, Reconciler,
    StoreError, ToggleKey, ToggleKind, ToggleMutation, ToggleState, ToggleWrite,
};
pub use rows::{RowChangeListener, RowCollection, RowEntity, RowEvent, RowObserver};
pub use transport::{
    ChannelMessage, ChannelStatus, ChannelTransport, MemoryHub, MemoryTransport, RowChange,
    RowFilter, RowOp, SubscribeOptions, Subscription, TransportError,
};
