//! Local-first toggle: apply instantly, confirm remotely, reconcile.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::store::{CounterStore, StoreError, ToggleKey, ToggleState, ToggleWrite};

/// One in-flight toggle. Created at the user interaction, discarded once
/// confirmed or rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleMutation {
    pub key: ToggleKey,
    pub desired_state: bool,
    pub local_state: bool,
    pub local_count: u64,
    pub prior_state: bool,
    pub prior_count: u64,
}

impl ToggleMutation {
    /// Flip `current_state` and adjust the count by one. Decrements
    /// saturate at zero.
    pub fn begin(key: ToggleKey, current_state: bool, current_count: u64) -> Self {
        let desired_state = !current_state;
        let local_count = if desired_state {
            current_count.saturating_add(1)
        } else {
            current_count.saturating_sub(1)
        };
        Self {
            key,
            desired_state,
            local_state: desired_state,
            local_count,
            prior_state: current_state,
            prior_count: current_count,
        }
    }

    /// The optimistic view.
    pub fn local(&self) -> ToggleState {
        ToggleState {
            state: self.local_state,
            count: self.local_count,
        }
    }

    /// The view before the interaction.
    pub fn rollback(&self) -> ToggleState {
        ToggleState {
            state: self.prior_state,
            count: self.prior_count,
        }
    }
}

/// The only error a toggle surfaces. `rollback` is what the UI must show.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("failed to update {key}: {source}")]
    Remote {
        key: ToggleKey,
        rollback: ToggleState,
        #[source]
        source: StoreError,
    },
}

impl ReconcileError {
    pub fn rollback(&self) -> ToggleState {
        match self {
            ReconcileError::Remote { rollback, .. } => *rollback,
        }
    }
}

/// Shared toggle implementation for every toggle-style feature.
///
/// Holds no per-resource state, so concurrent calls for different keys
/// are independent. Callers serialize calls for the same key.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn CounterStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub async fn toggle(
        &self,
        key: ToggleKey,
        current_state: bool,
        current_count: u64,
    ) -> Result<ToggleState, ReconcileError> {
        self.toggle_with(key, current_state, current_count, |_| {})
            .await
    }

    /// Like [`Reconciler::toggle`], calling `apply_local` with the
    /// optimistic view before any network call is made.
    pub async fn toggle_with<F>(
        &self,
        key: ToggleKey,
        current_state: bool,
        current_count: u64,
        apply_local: F,
    ) -> Result<ToggleState, ReconcileError>
    where
        F: FnOnce(ToggleState) + Send,
    {
        let mutation = ToggleMutation::begin(key, current_state, current_count);
        apply_local(mutation.local());

        let written = if mutation.desired_state {
            self.store.insert_toggle(&mutation.key, true).await
        } else {
            self.store.update_toggle(&mutation.key, false).await
        };

        match written {
            Ok(write) => Ok(self.confirm(&mutation, write).await),
            Err(e) if e.is_race() => self.resolve_race(&mutation, e).await,
            Err(e) => Err(self.fail(&mutation, e)),
        }
    }

    /// Trust the written state; take the count from the store, never from
    /// the local increment.
    async fn confirm(&self, mutation: &ToggleMutation, write: ToggleWrite) -> ToggleState {
        let count = match write.count {
            Some(count) => count,
            None => match self.store.read_state(&mutation.key).await {
                Ok(current) => current.count,
                Err(e) => {
                    warn!(
                        key = %mutation.key,
                        error = %e,
                        "Count re-read failed, keeping local count"
                    );
                    mutation.local_count
                }
            },
        };
        debug!(key = %mutation.key, state = write.state, count, "Toggle confirmed");
        ToggleState {
            state: write.state,
            count,
        }
    }

    /// Another writer got there first. Adopt the authoritative state if it
    /// already matches, otherwise the record exists in the opposite state
    /// and is updated in place.
    async fn resolve_race(
        &self,
        mutation: &ToggleMutation,
        race: StoreError,
    ) -> Result<ToggleState, ReconcileError> {
        let current = self
            .store
            .read_state(&mutation.key)
            .await
            .map_err(|e| self.fail(mutation, e))?;

        if current.state == mutation.desired_state {
            info!(key = %mutation.key, reason = %race, "Toggle race resolved from store");
            return Ok(current);
        }

        match self
            .store
            .update_toggle(&mutation.key, mutation.desired_state)
            .await
        {
            Ok(write) => Ok(self.confirm(mutation, write).await),
            Err(e) => Err(self.fail(mutation, e)),
        }
    }

    fn fail(&self, mutation: &ToggleMutation, source: StoreError) -> ReconcileError {
        warn!(key = %mutation.key, error = %source, "Toggle rolled back");
        ReconcileError::Remote {
            key: mutation.key.clone(),
            rollback: mutation.rollback(),
            source,
        }
    }
}
