//! Identity-keyed collection folding insert/update/delete events.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::transport::{RowChange, RowOp};

/// A row type with a stable identity.
pub trait RowEntity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    fn id(&self) -> String;

    /// Identity of the owning row (e.g. the comment a reply belongs to).
    fn parent_id(&self) -> Option<String> {
        None
    }

    /// Identity carried by a raw record. Delete payloads usually hold
    /// only the primary key, so this must not require a full row.
    fn id_of(record: &serde_json::Value) -> Option<String> {
        match record.get("id")? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// What a change did to the collection.
#[derive(Debug, Clone, PartialEq)]
pub enum RowEvent<T> {
    Inserted(T),
    Updated(T),
    /// The deleted row followed by any cascaded children.
    Removed(Vec<T>),
}

/// Ordered rows, at most one per identity.
#[derive(Debug, Clone)]
pub struct RowCollection<T> {
    items: Vec<T>,
}

impl<T> Default for RowCollection<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: RowEntity> RowCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an initial page, dropping repeated identities.
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        let mut collection = Self::new();
        for item in items {
            collection.insert(item);
        }
        collection
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Append unless the identity is already held. Returns whether it was added.
    pub fn insert(&mut self, entity: T) -> bool {
        if self.contains(&entity.id()) {
            return false;
        }
        self.items.push(entity);
        true
    }

    /// Merge `fields` into the held row. No-op if the row is not held.
    pub fn patch(&mut self, id: &str, fields: &serde_json::Value) -> Option<T> {
        let slot = self.items.iter_mut().find(|item| item.id() == id)?;
        let mut merged = match serde_json::to_value(&*slot) {
            Ok(value) => value,
            Err(e) => {
                warn!(id = %id, error = %e, "Row not serializable");
                return None;
            }
        };
        if let (Some(target), Some(source)) = (merged.as_object_mut(), fields.as_object()) {
            for (k, v) in source {
                target.insert(k.clone(), v.clone());
            }
        }
        match serde_json::from_value::<T>(merged) {
            Ok(updated) => {
                *slot = updated.clone();
                Some(updated)
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Row patch rejected");
                None
            }
        }
    }

    /// Remove the row and every descendant held locally.
    pub fn remove(&mut self, id: &str) -> Vec<T> {
        if !self.contains(id) {
            return Vec::new();
        }
        let mut doomed: HashSet<String> = HashSet::from([id.to_string()]);
        loop {
            let before = doomed.len();
            for item in &self.items {
                if item.parent_id().is_some_and(|p| doomed.contains(&p)) {
                    doomed.insert(item.id());
                }
            }
            if doomed.len() == before {
                break;
            }
        }

        let (removed, kept): (Vec<T>, Vec<T>) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|item| doomed.contains(&item.id()));
        self.items = kept;

        // Deleted row first, children after.
        let mut removed = removed;
        if let Some(pos) = removed.iter().position(|item| item.id() == id) {
            let root = removed.remove(pos);
            removed.insert(0, root);
        }
        removed
    }

    /// Fold one row change. Returns `None` if nothing changed.
    pub fn apply(&mut self, change: &RowChange) -> Option<RowEvent<T>> {
        match change.op {
            RowOp::Insert => {
                let entity = match serde_json::from_value::<T>(change.record.clone()) {
                    Ok(entity) => entity,
                    Err(e) => {
                        debug!(table = %change.table, error = %e, "Undecodable inserted row");
                        return None;
                    }
                };
                if self.insert(entity.clone()) {
                    Some(RowEvent::Inserted(entity))
                } else {
                    debug!(table = %change.table, id = %entity.id(), "Duplicate insert ignored");
                    None
                }
            }
            RowOp::Update => {
                let id = T::id_of(&change.record)?;
                self.patch(&id, &change.record).map(RowEvent::Updated)
            }
            RowOp::Delete => {
                let id = T::id_of(change.identity_record())?;
                let removed = self.remove(&id);
                (!removed.is_empty()).then_some(RowEvent::Removed(removed))
            }
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
