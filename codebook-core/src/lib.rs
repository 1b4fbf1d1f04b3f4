//! # codebook-core — edit-event model for code evolution capture
//!
//! Turns successive whole-document snapshots into a stream of discrete
//! insert/remove events. Nothing in this crate touches the file system;
//! persistence and notification handling live in `codebook-capture`.
//!
//! ```text
//! previous snapshot ─┐
//!                    ├── diff::diff ──► EditScript ── translate ──► EditEvent?
//! current snapshot ──┘                                  ▲
//!                                        CursorPosition ┘
//! ```
//!
//! ## Modules
//!
//! - [`identity`] — path → [`DocumentId`], one-time [`SessionHeader`]
//! - [`diff`] — Myers shortest edit script over chars or lines
//! - [`translate`] — edit script → at most one [`EditEvent`]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod diff;
pub mod identity;
pub mod translate;

pub use diff::{diff, EditScript, Granularity, Span, SpanTag};
pub use identity::{
    identity_of, probe_outbound_ip, DocumentId, IdentityResolver, LocalIdentity, ProbedAddress,
};
pub use translate::translate;

/// Where in the document an edit was applied.
///
/// Serialized with the short keys of the on-disk format
/// (`{"pos": …, "l": …, "c": …}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CursorPosition {
    /// Absolute character offset.
    #[serde(rename = "pos")]
    pub offset: usize,
    #[serde(rename = "l")]
    pub line: usize,
    #[serde(rename = "c")]
    pub column: usize,
}

impl CursorPosition {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }
}

/// Kind of edit carried by an [`EditEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditAction {
    #[serde(rename = "i")]
    Insert,
    #[serde(rename = "r")]
    Remove,
}

/// One observed edit. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditEvent {
    /// Inserted or removed text.
    #[serde(rename = "v")]
    pub value: String,
    #[serde(rename = "pos")]
    pub position: CursorPosition,
    #[serde(rename = "ac")]
    pub action: EditAction,
    /// RFC 3339 / ISO-8601 on the wire.
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
}

impl EditEvent {
    pub fn insert(value: impl Into<String>, position: CursorPosition, timestamp: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            position,
            action: EditAction::Insert,
            timestamp,
        }
    }

    pub fn remove(value: impl Into<String>, position: CursorPosition, timestamp: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            position,
            action: EditAction::Remove,
            timestamp,
        }
    }

    pub fn is_insert(&self) -> bool {
        self.action == EditAction::Insert
    }
}

/// Environment in which a document was first observed.
///
/// Written once per document identity and never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHeader {
    pub user: String,
    pub host: String,
    /// Best-effort routable address; loopback when unresolved.
    pub ip: String,
    pub file: String,
}
