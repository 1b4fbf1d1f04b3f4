//! Durable storage for session headers and event logs.
//!
//! Layout:
//! ```text
//! <root>/
//!   ├── <id>.header   — SessionHeader JSON, written once
//!   ├── <id>.data     — JSON array of EditEvent, overwritten on every flush
//!   └── .<name>.tmp   — in-flight write, renamed over the target
//! ```
//!
//! `<id>` is the 32-hex-digit [`DocumentId`].

pub mod files;

use std::io;
use std::path::PathBuf;

use codebook_core::{DocumentId, EditEvent, SessionHeader};
use thiserror::Error;

pub use files::FileStore;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Root directory could not be created (other than "already exists")
    #[error("Cannot create storage directory {}: {source}", path.display())]
    Bootstrap {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Read, write or rename failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Encoding a record failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A stored record is not valid JSON for its type
    #[error("Corrupt record {}: {source}", path.display())]
    Deserialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Key-value persistence for one header and one event log per document.
///
/// Implementations must make each write atomic from a reader's point of
/// view: a record is either the previous complete value or the new one.
pub trait EventStore {
    /// Whether a header exists for `id`.
    fn has_header(&self, id: DocumentId) -> Result<bool, StoreError>;

    fn load_header(&self, id: DocumentId) -> Result<Option<SessionHeader>, StoreError>;

    /// Write `header` unless one is already stored. Returns `true` if written.
    fn save_header_if_absent(
        &self,
        id: DocumentId,
        header: &SessionHeader,
    ) -> Result<bool, StoreError>;

    /// `Ok(None)` when nothing has been flushed for `id` yet.
    fn load_events(&self, id: DocumentId) -> Result<Option<Vec<EditEvent>>, StoreError>;

    /// Replace the stored log for `id` with `events`.
    fn save_events(&self, id: DocumentId, events: &[EditEvent]) -> Result<(), StoreError>;

    /// Every id with a header or a log, sorted.
    fn list_documents(&self) -> Result<Vec<DocumentId>, StoreError>;
}
