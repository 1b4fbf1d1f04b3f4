//! Edit recorder: per-document registry driven by host notifications.
//!
//! ```text
//! open/activate ──► on_open ──► reconcile log ◄── EventStore (read)
//!                          └──► header (once) ──► EventStore (write)
//! changed ────────► on_change ─► diff ─► translate ─► EventLog::append
//!                                                        │
//!                                          FlushPolicy ──┴─► EventStore (write)
//! close ──────────► on_close ──► flush every tracked document
//! ```
//!
//! Each document owns its log, last snapshot and cursor behind its own
//! mutex. The registry lock is only held to look up or insert entries, and
//! flushing all documents locks them one at a time, so a slow write for
//! one document never blocks notifications for another.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use codebook_core::identity::{DEFAULT_PROBE_TARGET, LOOPBACK};
use codebook_core::{
    diff, identity_of, translate, CursorPosition, DocumentId, EditEvent, Granularity,
    IdentityResolver, LocalIdentity,
};
use thiserror::Error;

use crate::event_log::EventLog;
use crate::flush::{FlushPolicy, FlushReport, DEFAULT_FLUSH_THRESHOLD};
use crate::host::{HostEditor, Notification, NotificationKind, UI_ONLY_CODE};
use crate::storage::{EventStore, FileStore, StoreError};

/// Recorder configuration.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Storage directory
    pub root: PathBuf,
    /// Events between threshold flushes (0 = flush on close only)
    pub flush_threshold: usize,
    /// Notification code that never triggers a diff
    pub ui_only_code: i32,
    /// Token size for snapshot diffs
    pub granularity: Granularity,
    /// Address used to discover the outbound interface for session headers
    pub probe_target: SocketAddr,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            ui_only_code: UI_ONLY_CODE,
            granularity: Granularity::Char,
            probe_target: DEFAULT_PROBE_TARGET,
        }
    }
}

impl RecorderConfig {
    /// Config for testing: given root, probe stays on loopback.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            root: path.into(),
            probe_target: SocketAddr::new(LOOPBACK, 9),
            ..Self::default()
        }
    }
}

/// `~/codebook`, or `./codebook` when no home directory is known.
pub fn default_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("codebook")
}

/// Recorder-level errors.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Flush failed for document {id}: {source}")]
    Flush {
        id: DocumentId,
        #[source]
        source: StoreError,
    },
    #[error("Document {0} is not tracked")]
    Untracked(DocumentId),
}

/// Where a tracked document is in its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Open,
    Closed,
}

/// What a dispatched notification did.
#[derive(Debug)]
pub enum Dispatched {
    /// Open/activate reconciled this document
    Opened(DocumentId),
    /// A content change produced this event
    Recorded(EditEvent),
    /// Content notification with no resulting event
    Unchanged,
    /// Nothing to act on (UI-only code, host had no answer)
    Ignored,
    /// Close flushed every tracked document
    Closed(FlushReport),
}

#[derive(Debug)]
struct DocumentState {
    log: EventLog,
    last_snapshot: String,
    last_cursor: Option<CursorPosition>,
    lifecycle: Lifecycle,
}

impl DocumentState {
    fn new(log: EventLog) -> Self {
        Self {
            log,
            last_snapshot: String::new(),
            last_cursor: None,
            lifecycle: Lifecycle::Open,
        }
    }
}

type Entry = Arc<Mutex<DocumentState>>;

/// Captures edit events for every document the host reports.
pub struct Recorder {
    config: RecorderConfig,
    policy: FlushPolicy,
    store: Box<dyn EventStore + Send + Sync>,
    resolver: Box<dyn IdentityResolver + Send + Sync>,
    /// document id → state; lives as long as the recorder
    documents: RwLock<HashMap<DocumentId, Entry>>,
    /// Most recently opened or activated document
    active: Mutex<Option<DocumentId>>,
}

impl Recorder {
    /// Open a recorder backed by a [`FileStore`] at `config.root`.
    ///
    /// Fails only if the storage directory cannot be created.
    pub fn open(config: RecorderConfig) -> Result<Self, StoreError> {
        let store = FileStore::open(&config.root)?;
        let resolver = LocalIdentity::new(config.probe_target);
        log::info!("Recording edits under {}", config.root.display());
        Ok(Self::with_parts(config, store, resolver))
    }

    /// Build a recorder over any store and header source.
    pub fn with_parts(
        config: RecorderConfig,
        store: impl EventStore + Send + Sync + 'static,
        resolver: impl IdentityResolver + Send + Sync + 'static,
    ) -> Self {
        Self {
            policy: FlushPolicy::new(config.flush_threshold),
            config,
            store: Box::new(store),
            resolver: Box::new(resolver),
            documents: RwLock::new(HashMap::new()),
            active: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    // ─── Lifecycle ────────────────────────────────────────────────────

    /// Start (or resume) tracking `path`.
    ///
    /// Any persisted log extends the in-memory one; an unreadable log is
    /// treated as absent. The session header is written only if none exists.
    pub fn on_open(&self, path: &str) -> DocumentId {
        let id = identity_of(path);
        log::info!("Opened {path} as document {id}");

        {
            // A fresh entry was just loaded from storage
            let (entry, fresh) = self.entry(id);
            let mut state = lock(&entry);
            state.lifecycle = Lifecycle::Open;

            if !fresh {
                if let Some(persisted) = self.load_persisted(id) {
                    let adopted = state.log.hydrate(persisted);
                    if adopted > 0 {
                        log::info!("Restored {adopted} persisted events for document {id}");
                    }
                }
            }
        }

        self.ensure_header(id, path);
        *lock(&self.active) = Some(id);
        id
    }

    fn ensure_header(&self, id: DocumentId, path: &str) {
        match self.store.has_header(id) {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                log::warn!("Cannot check header for document {id}: {e}");
                return;
            }
        }

        let header = self.resolver.build_header(path);
        match self.store.save_header_if_absent(id, &header) {
            Ok(true) => log::info!(
                "Created header for document {id} ({}@{}, {})",
                header.user,
                header.host,
                header.ip
            ),
            Ok(false) => {}
            Err(e) => log::error!("Failed to write header for document {id}: {e}"),
        }
    }

    /// Process a content check for `id`.
    ///
    /// Identical snapshots are skipped without diffing. Otherwise the last
    /// snapshot becomes `current` whether or not an event results; without
    /// a cursor no event is produced.
    pub fn on_change(
        &self,
        id: DocumentId,
        current: &str,
        position: Option<CursorPosition>,
        now: DateTime<Utc>,
    ) -> Option<EditEvent> {
        let (entry, _) = self.entry(id);
        let mut state = lock(&entry);
        if position.is_some() {
            state.last_cursor = position;
        }

        if state.last_snapshot == current {
            return None;
        }
        let previous = std::mem::replace(&mut state.last_snapshot, current.to_string());

        let Some(position) = position else {
            log::debug!("Change in document {id} without cursor; not recorded");
            return None;
        };

        let script = diff(&previous, current, self.config.granularity);
        let event = translate(&script, position, now)?;
        let pending = state.log.append(event.clone());

        if self.policy.should_flush(pending) {
            // Failure is logged inside; the log stays in memory for the retry
            let _ = self.flush_locked(id, &mut state);
        }
        Some(event)
    }

    /// Cursor moved without a content change.
    pub fn note_cursor(&self, id: DocumentId, position: CursorPosition) {
        let (entry, _) = self.entry(id);
        lock(&entry).last_cursor = Some(position);
    }

    /// Close `id` (if known) and flush every tracked document.
    pub fn on_close(&self, id: Option<DocumentId>) -> FlushReport {
        if let Some(id) = id {
            if let Some(entry) = self.get(id) {
                lock(&entry).lifecycle = Lifecycle::Closed;
            }
            log::info!("Closed document {id}");
            let mut active = lock(&self.active);
            if *active == Some(id) {
                *active = None;
            }
        }
        self.flush_all()
    }

    /// Final flush before the host unloads the recorder.
    pub fn shutdown(&self) -> FlushReport {
        let report = self.flush_all();
        log::info!(
            "Recorder shut down: {} documents flushed, {} failed",
            report.flushed.len(),
            report.failed.len()
        );
        report
    }

    // ─── Flushing ─────────────────────────────────────────────────────

    /// Write the full log of `id` to storage. Returns the events written.
    pub fn flush(&self, id: DocumentId) -> Result<usize, CaptureError> {
        let entry = self.get(id).ok_or(CaptureError::Untracked(id))?;
        let mut state = lock(&entry);
        self.flush_locked(id, &mut state)
            .map_err(|source| CaptureError::Flush { id, source })
    }

    /// Flush every tracked document, one lock at a time.
    pub fn flush_all(&self) -> FlushReport {
        let entries: Vec<(DocumentId, Entry)> = read(&self.documents)
            .iter()
            .map(|(id, entry)| (*id, Arc::clone(entry)))
            .collect();

        let mut report = FlushReport::default();
        for (id, entry) in entries {
            let mut state = lock(&entry);
            match self.flush_locked(id, &mut state) {
                Ok(n) => report.flushed.push((id, n)),
                Err(e) => report.failed.push((id, e)),
            }
        }
        report
    }

    fn flush_locked(&self, id: DocumentId, state: &mut DocumentState) -> Result<usize, StoreError> {
        match self.store.save_events(id, state.log.events()) {
            Ok(()) => {
                state.log.mark_flushed();
                log::debug!("Flushed {} events for document {id}", state.log.len());
                Ok(state.log.len())
            }
            Err(e) => {
                log::error!(
                    "Flush failed for document {id} ({} events kept in memory): {e}",
                    state.log.len()
                );
                Err(e)
            }
        }
    }

    // ─── Notifications ────────────────────────────────────────────────

    /// Route one host notification, stamping events with the current time.
    pub fn dispatch(&self, host: &dyn HostEditor, notification: &Notification) -> Dispatched {
        self.dispatch_at(host, notification, Utc::now())
    }

    /// Route one host notification with an explicit timestamp.
    pub fn dispatch_at(
        &self,
        host: &dyn HostEditor,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> Dispatched {
        match notification.kind {
            NotificationKind::Open | NotificationKind::Activate => {
                let path = notification
                    .path
                    .clone()
                    .or_else(|| host.current_document_path());
                match path {
                    Some(path) => Dispatched::Opened(self.on_open(&path)),
                    None => {
                        log::warn!("{:?} notification without a document path", notification.kind);
                        Dispatched::Ignored
                    }
                }
            }
            NotificationKind::Close => {
                let id = notification
                    .path
                    .clone()
                    .or_else(|| host.current_document_path())
                    .map(|p| identity_of(&p))
                    .or_else(|| self.active());
                Dispatched::Closed(self.on_close(id))
            }
            NotificationKind::Changed => {
                let Some(path) = host.current_document_path() else {
                    return Dispatched::Ignored;
                };
                let id = identity_of(&path);
                let cursor = host.current_cursor();

                if notification.code == self.config.ui_only_code {
                    if let Some(cursor) = cursor {
                        self.note_cursor(id, cursor);
                    }
                    return Dispatched::Ignored;
                }

                let Some(text) = host.current_full_text() else {
                    return Dispatched::Ignored;
                };
                match self.on_change(id, &text, cursor, now) {
                    Some(event) => Dispatched::Recorded(event),
                    None => Dispatched::Unchanged,
                }
            }
        }
    }

    // ─── Inspection ───────────────────────────────────────────────────

    /// Copy of the in-memory log for `id`.
    pub fn events(&self, id: DocumentId) -> Vec<EditEvent> {
        self.get(id)
            .map(|entry| lock(&entry).log.events().to_vec())
            .unwrap_or_default()
    }

    /// Events appended to `id` since its last successful flush.
    pub fn pending(&self, id: DocumentId) -> usize {
        self.get(id).map_or(0, |entry| lock(&entry).log.pending())
    }

    pub fn last_cursor(&self, id: DocumentId) -> Option<CursorPosition> {
        self.get(id).and_then(|entry| lock(&entry).last_cursor)
    }

    pub fn lifecycle(&self, id: DocumentId) -> Option<Lifecycle> {
        self.get(id).map(|entry| lock(&entry).lifecycle)
    }

    /// Every tracked document, sorted.
    pub fn tracked(&self) -> Vec<DocumentId> {
        let mut ids: Vec<DocumentId> = read(&self.documents).keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn active(&self) -> Option<DocumentId> {
        *lock(&self.active)
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    fn get(&self, id: DocumentId) -> Option<Entry> {
        read(&self.documents).get(&id).cloned()
    }

    /// Get or create the state for `id`, and whether it was just created.
    ///
    /// A new entry starts from the stored log, so a later flush can only
    /// extend what is on disk.
    fn entry(&self, id: DocumentId) -> (Entry, bool) {
        if let Some(entry) = self.get(id) {
            return (entry, false);
        }

        let persisted = self.load_persisted(id).unwrap_or_default();
        let restored = persisted.len();
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match documents.entry(id) {
            MapEntry::Occupied(slot) => (Arc::clone(slot.get()), false),
            MapEntry::Vacant(slot) => {
                if restored > 0 {
                    log::info!("Restored {restored} persisted events for document {id}");
                }
                let state = DocumentState::new(EventLog::from_persisted(persisted));
                (Arc::clone(slot.insert(Arc::new(Mutex::new(state)))), true)
            }
        }
    }

    /// Stored log for `id`; unreadable records count as absent.
    fn load_persisted(&self, id: DocumentId) -> Option<Vec<EditEvent>> {
        match self.store.load_events(id) {
            Ok(Some(events)) => Some(events),
            Ok(None) => {
                log::debug!("No persisted log for document {id}");
                None
            }
            Err(e) => {
                log::warn!("Ignoring unreadable log for document {id}: {e}");
                None
            }
        }
    }
}

// Document state is append-only, so a panic mid-update leaves it usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}
