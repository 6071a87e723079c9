//! Local collections kept in sync with table row changes.
//!
//! Used for comment streams (append, patch, cascade delete) and for
//! refreshing counters when related rows change.

mod collection;
mod listener;

pub use collection::{RowCollection, RowEntity, RowEvent};
pub use listener::{RowChangeListener, RowObserver};
