//! Optimistic toggle mutations (like, follow, pin) reconciled against a
//! durable counter store.
//!
//! The local view is updated before the network call. Unique-key races
//! are resolved by re-reading authoritative state; every other remote
//! failure rolls the view back to its prior snapshot.

mod memory;
mod postgrest;
mod reconciler;
mod store;

pub use memory::MemoryCounterStore;
pub use postgrest::PostgrestCounterStore;
pub use reconciler::{ReconcileError, Reconciler, ToggleMutation};
pub use store::{CounterStore, StoreError, ToggleKey, ToggleKind, ToggleState, ToggleWrite};
