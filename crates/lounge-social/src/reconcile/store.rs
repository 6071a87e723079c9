//! Counter store contract and shared types.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Which toggle-style relation a mutation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleKind {
    PostLike,
    CommentLike,
    Follow,
    Pin,
}

impl ToggleKind {
    pub const ALL: [ToggleKind; 4] = [
        ToggleKind::PostLike,
        ToggleKind::CommentLike,
        ToggleKind::Follow,
        ToggleKind::Pin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToggleKind::PostLike => "post_like",
            ToggleKind::CommentLike => "comment_like",
            ToggleKind::Follow => "follow",
            ToggleKind::Pin => "pin",
        }
    }
}

impl fmt::Display for ToggleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToggleKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToggleKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| StoreError::UnknownKind(s.to_string()))
    }
}

/// One (subject, resource) pair; the store holds at most one record per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToggleKey {
    pub kind: ToggleKind,
    pub subject_id: String,
    pub resource_id: String,
}

impl ToggleKey {
    pub fn new(
        kind: ToggleKind,
        subject_id: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            subject_id: subject_id.into(),
            resource_id: resource_id.into(),
        }
    }
}

impl fmt::Display for ToggleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}->{}", self.kind, self.subject_id, self.resource_id)
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// What the UI renders: whether the subject has toggled the resource on,
/// and how many subjects have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleState {
    pub state: bool,
    pub count: u64,
}

/// Result of a write. Stores that cannot return the count cheaply leave it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleWrite {
    pub state: bool,
    pub count: Option<u64>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Unique-key violation: the record was created concurrently.
    #[error("toggle record already exists: {0}")]
    Conflict(String),
    #[error("toggle record not found")]
    NotFound,
    #[error("network error: {0}")]
    Network(String),
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("no table configured for toggle kind {0}")]
    UnknownKind(String),
}

impl StoreError {
    /// A race with another writer, resolved by re-reading.
    pub fn is_race(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::NotFound)
    }
}

impl From<StoreError> for lounge_common::LoungeError {
    fn from(e: StoreError) -> Self {
        lounge_common::LoungeError::Store(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Authoritative state for the key and total count for the resource.
    async fn read_state(&self, key: &ToggleKey) -> Result<ToggleState, StoreError>;

    /// Create the toggle record. Fails with [`StoreError::Conflict`] if one exists.
    async fn insert_toggle(&self, key: &ToggleKey, state: bool) -> Result<ToggleWrite, StoreError>;

    /// Set the state of an existing record. Fails with
    /// [`StoreError::NotFound`] if there is none.
    async fn update_toggle(&self, key: &ToggleKey, state: bool) -> Result<ToggleWrite, StoreError>;
}
