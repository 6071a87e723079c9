//! In-memory counter store for tests and offline runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::store::{CounterStore, StoreError, ToggleKey, ToggleKind, ToggleState, ToggleWrite};

/// (kind, resource) -> subject -> state
type Records = HashMap<(ToggleKind, String), HashMap<String, bool>>;

/// Enforces the same one-record-per-(subject, resource) constraint as the
/// hosted tables.
#[derive(Default)]
pub struct MemoryCounterStore {
    records: RwLock<Records>,
    report_counts: bool,
    failure: RwLock<Option<StoreError>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self {
            report_counts: true,
            ..Default::default()
        }
    }

    /// Writes return no count, forcing callers to re-read it.
    pub fn without_counts() -> Self {
        Self::default()
    }

    /// Put a record in place directly, bypassing the uniqueness check.
    pub async fn seed(&self, key: &ToggleKey, state: bool) {
        self.records
            .write()
            .await
            .entry((key.kind, key.resource_id.clone()))
            .or_default()
            .insert(key.subject_id.clone(), state);
    }

    /// Make every subsequent call fail with `error` until cleared.
    pub async fn fail_with(&self, error: StoreError) {
        *self.failure.write().await = Some(error);
    }

    pub async fn clear_failure(&self) {
        *self.failure.write().await = None;
    }

    async fn check_failure(&self) -> Result<(), StoreError> {
        match self.failure.read().await.as_ref() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn count(records: &Records, key: &ToggleKey) -> u64 {
        records
            .get(&(key.kind, key.resource_id.clone()))
            .map(|subjects| subjects.values().filter(|on| **on).count() as u64)
            .unwrap_or(0)
    }

    fn write_result(&self, records: &Records, key: &ToggleKey, state: bool) -> ToggleWrite {
        ToggleWrite {
            state,
            count: self.report_counts.then(|| Self::count(records, key)),
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn read_state(&self, key: &ToggleKey) -> Result<ToggleState, StoreError> {
        self.check_failure().await?;
        let records = self.records.read().await;
        let state = records
            .get(&(key.kind, key.resource_id.clone()))
            .and_then(|subjects| subjects.get(&key.subject_id))
            .copied()
            .unwrap_or(false);
        Ok(ToggleState {
            state,
            count: Self::count(&records, key),
        })
    }

    async fn insert_toggle(&self, key: &ToggleKey, state: bool) -> Result<ToggleWrite, StoreError> {
        self.check_failure().await?;
        let mut records = self.records.write().await;
        let subjects = records
            .entry((key.kind, key.resource_id.clone()))
            .or_default();
        if subjects.contains_key(&key.subject_id) {
            return Err(StoreError::Conflict(key.to_string()));
        }
        subjects.insert(key.subject_id.clone(), state);
        Ok(self.write_result(&records, key, state))
    }

    async fn update_toggle(&self, key: &ToggleKey, state: bool) -> Result<ToggleWrite, StoreError> {
        self.check_failure().await?;
        let mut records = self.records.write().await;
        let slot = records
            .get_mut(&(key.kind, key.resource_id.clone()))
            .and_then(|subjects| subjects.get_mut(&key.subject_id))
            .ok_or(StoreError::NotFound)?;
        *slot = state;
        Ok(self.write_result(&records, key, state))
    }
}
