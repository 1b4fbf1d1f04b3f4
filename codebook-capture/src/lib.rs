//! # codebook-capture — Edit capture and persistence
//!
//! Turns a stream of editor notifications into per-document edit logs and
//! mirrors them to disk.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  Notification   ┌─────────────┐  diff/translate  ┌─────────────┐
//! │ HostEditor  │ ──────────────► │  Recorder   │ ───────────────► │  EventLog   │
//! │ (path/text/ │ ◄────────────── │ (registry)  │                  │ (per doc)   │
//! │  cursor)    │    queries      └──────┬──────┘                  └──────┬──────┘
//! └─────────────┘                        │ FlushPolicy                    │
//!                                        ▼                                │
//!                                 ┌─────────────┐     full log            │
//!                                 │ EventStore  │ ◄───────────────────────┘
//!                                 │ (FileStore) │
//!                                 └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`recorder`] — Document registry, notification dispatch, reconciliation
//! - [`event_log`] — Append-only in-memory log with a pending counter
//! - [`flush`] — Threshold policy and multi-document flush reports
//! - [`host`] — Host editor trait, notifications, in-memory host
//! - [`storage`] — Header and log persistence

pub mod event_log;
pub mod flush;
pub mod host;
pub mod recorder;
pub mod storage;

pub use event_log::EventLog;
pub use flush::{FlushPolicy, FlushReport, DEFAULT_FLUSH_THRESHOLD};
pub use host::{BufferHost, HostEditor, Notification, NotificationKind, UI_ONLY_CODE};
pub use recorder::{CaptureError, Dispatched, Lifecycle, Recorder, RecorderConfig};
pub use storage::{EventStore, FileStore, StoreError};
