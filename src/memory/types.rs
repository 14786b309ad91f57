//! Record types shared by the store and the engine.
//!
//! [`MemoryRecord`] is the public shape of a stored memory, [`HistoryEntry`] one
//! step of its change log, and [`MemoryEvent`] the outcome of merging one
//! extracted fact.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::scope::ScopeIds;

/// A memory as returned to callers. The embedding never leaves the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// UUID v7 assigned at creation.
    pub id: String,
    /// Current canonical content.
    pub text: String,
    #[serde(flatten)]
    pub scope: ScopeIds,
    pub metadata: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
    /// Cosine similarity to the query, only set by search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Input for inserting a brand-new record.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub text: String,
    pub embedding: Vec<f32>,
    pub scope: ScopeIds,
    pub metadata: Map<String, Value>,
}

/// Replacement content for an existing record. `metadata: None` leaves the
/// stored metadata untouched.
#[derive(Debug, Clone)]
pub struct MemoryUpdate {
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: Option<Map<String, Value>>,
}

/// Closest record within one scope triple.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestMatch {
    pub id: String,
    pub text: String,
    pub similarity: f64,
}

/// Operation recorded in a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOperation {
    /// Text was replaced; the entry holds the text before the update.
    Update,
    /// Record was deleted; the entry holds its last text.
    Delete,
    /// Synthetic final entry carrying the live state.
    Current,
}

impl HistoryOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Current => "current",
        }
    }
}

impl std::fmt::Display for HistoryOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HistoryOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "current" => Ok(Self::Current),
            _ => Err(format!("unknown history operation: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub text: String,
    pub operation: HistoryOperation,
    pub timestamp: String,
}

/// `{memory_id, history}` as returned by `get_memory_history`.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryHistory {
    pub memory_id: String,
    pub history: Vec<HistoryEntry>,
}

/// What happened to one extracted fact during `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemoryEvent {
    /// Inserted as a new record.
    Add,
    /// Merged into a near-identical record by replacing its text.
    Update,
    /// Already stored verbatim; nothing written.
    None,
}

impl MemoryEvent {
    /// `true` for events that changed the store.
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::None)
    }
}
