//! File-system backed [`EventStore`].
//!
//! Every write goes to a hidden temp file in the same directory, is
//! fsynced, then moved into place, so readers never observe a half-written
//! record. Logs are renamed over the target. Headers are hard-linked, which
//! fails if one already exists, so exactly one writer wins even across
//! processes. Serialization is compact JSON with a fixed field order:
//! flushing the same log twice produces identical bytes.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use codebook_core::{DocumentId, EditEvent, SessionHeader};
use serde::de::DeserializeOwned;

use super::{EventStore, StoreError};

const HEADER_EXT: &str = "header";
const DATA_EXT: &str = "data";

/// Distinguishes temp files of concurrent writers within one process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// JSON files under a single root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open the store at `root`, creating the directory if needed.
    ///
    /// An existing directory is fine; any other creation failure
    /// (permissions, a file in the way) is returned.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        if let Err(source) = fs::create_dir_all(&root) {
            if !root.is_dir() {
                return Err(StoreError::Bootstrap { path: root, source });
            }
        }
        log::debug!("Storage root ready at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn header_path(&self, id: DocumentId) -> PathBuf {
        self.root.join(format!("{id}.{HEADER_EXT}"))
    }

    pub fn data_path(&self, id: DocumentId) -> PathBuf {
        self.root.join(format!("{id}.{DATA_EXT}"))
    }

    /// Exact bytes written for `events` by [`EventStore::save_events`].
    pub fn encode_events(events: &[EditEvent]) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(events)?)
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StoreError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StoreError::Deserialization {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Write `bytes` to a fresh temp file next to `path` and fsync it.
    fn write_temp(&self, path: &Path, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp_path = self
            .root
            .join(format!(".{file_name}.{}-{seq}.tmp", std::process::id()));

        let result = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .and_then(|mut tmp| {
                tmp.write_all(bytes)?;
                tmp.sync_all()
            });
        match result {
            Ok(()) => Ok(tmp_path),
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                Err(e)
            }
        }
    }

    /// Replace `path` with `bytes`.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        let tmp_path = self.write_temp(path, bytes).map_err(io_err)?;
        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_err(e));
        }
        Ok(())
    }

    /// Create `path` with `bytes` unless it exists. Returns `true` if created.
    fn write_exclusive(&self, path: &Path, bytes: &[u8]) -> Result<bool, StoreError> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        let tmp_path = self.write_temp(path, bytes).map_err(io_err)?;
        let linked = fs::hard_link(&tmp_path, path);
        let _ = fs::remove_file(&tmp_path);
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(io_err(e)),
        }
    }
}

impl EventStore for FileStore {
    fn has_header(&self, id: DocumentId) -> Result<bool, StoreError> {
        let path = self.header_path(id);
        path.try_exists()
            .map_err(|source| StoreError::Io { path, source })
    }

    fn load_header(&self, id: DocumentId) -> Result<Option<SessionHeader>, StoreError> {
        self.read_json(&self.header_path(id))
    }

    fn save_header_if_absent(
        &self,
        id: DocumentId,
        header: &SessionHeader,
    ) -> Result<bool, StoreError> {
        if self.has_header(id)? {
            return Ok(false);
        }
        let bytes = serde_json::to_vec(header)?;
        self.write_exclusive(&self.header_path(id), &bytes)
    }

    fn load_events(&self, id: DocumentId) -> Result<Option<Vec<EditEvent>>, StoreError> {
        self.read_json(&self.data_path(id))
    }

    fn save_events(&self, id: DocumentId, events: &[EditEvent]) -> Result<(), StoreError> {
        let bytes = Self::encode_events(events)?;
        self.write_atomic(&self.data_path(id), &bytes)
    }

    fn list_documents(&self) -> Result<Vec<DocumentId>, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut ids = BTreeSet::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_record = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some(HEADER_EXT) | Some(DATA_EXT)
            );
            if !is_record {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<DocumentId>().ok())
            {
                ids.insert(id);
            }
        }
        Ok(ids.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use codebook_core::{identity_of, CursorPosition};
    use tempfile::tempdir;

    fn header(host: &str) -> SessionHeader {
        SessionHeader {
            user: "dev".into(),
            host: host.into(),
            ip: "127.0.0.1".into(),
            file: "/work/a.rs".into(),
        }
    }

    fn events(n: usize) -> Vec<EditEvent> {
        (0..n)
            .map(|i| {
                EditEvent::insert(
                    format!("{i}"),
                    CursorPosition::new(i, 0, i),
                    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, i as u32).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_open_creates_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested").join("codebook");
        let store = FileStore::open(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(store.root(), root.as_path());
    }

    #[test]
    fn test_open_existing_root_is_idempotent() {
        let dir = tempdir().unwrap();
        FileStore::open(dir.path()).unwrap();
        FileStore::open(dir.path()).unwrap();
    }

    #[test]
    fn test_open_fails_when_root_is_a_file() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("codebook");
        fs::write(&blocker, b"not a directory").unwrap();

        let err = FileStore::open(&blocker).unwrap_err();
        assert!(matches!(err, StoreError::Bootstrap { .. }));
    }

    #[test]
    fn test_missing_records_read_as_none() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let id = identity_of("/nowhere");

        assert!(!store.has_header(id).unwrap());
        assert!(store.load_header(id).unwrap().is_none());
        assert!(store.load_events(id).unwrap().is_none());
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let id = identity_of("/work/a.rs");

        assert!(store.save_header_if_absent(id, &header("first")).unwrap());
        assert!(!store.save_header_if_absent(id, &header("second")).unwrap());
        assert_eq!(store.load_header(id).unwrap().unwrap().host, "first");
    }

    #[test]
    fn test_concurrent_header_writers_one_wins() {
        let dir = tempdir().unwrap();
        let id = identity_of("/work/a.rs");
        let hosts = ["h0", "h1", "h2", "h3", "h4", "h5", "h6", "h7"];

        let winners: Vec<&str> = std::thread::scope(|s| {
            let handles: Vec<_> = hosts
                .iter()
                .map(|host| {
                    // One store per writer, as separate processes would have
                    let store = FileStore::open(dir.path()).unwrap();
                    s.spawn(move || {
                        store
                            .save_header_if_absent(id, &header(host))
                            .unwrap()
                            .then_some(*host)
                    })
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|h| h.join().unwrap())
                .collect()
        });

        assert_eq!(winners.len(), 1);
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.load_header(id).unwrap().unwrap().host, winners[0]);
    }

    #[test]
    fn test_events_overwritten_not_appended() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let id = identity_of("/work/a.rs");

        store.save_events(id, &events(3)).unwrap();
        store.save_events(id, &events(5)).unwrap();
        assert_eq!(store.load_events(id).unwrap().unwrap(), events(5));
    }

    #[test]
    fn test_save_events_is_byte_stable() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let id = identity_of("/work/a.rs");

        store.save_events(id, &events(4)).unwrap();
        let first = fs::read(store.data_path(id)).unwrap();
        store.save_events(id, &events(4)).unwrap();
        let second = fs::read(store.data_path(id)).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, FileStore::encode_events(&events(4)).unwrap());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let id = identity_of("/work/a.rs");
        store.save_events(id, &events(2)).unwrap();
        store.save_header_if_absent(id, &header("h")).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_corrupt_data_is_an_error() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let id = identity_of("/work/a.rs");
        fs::write(store.data_path(id), b"[{\"v\": broken").unwrap();

        let err = store.load_events(id).unwrap_err();
        assert!(matches!(err, StoreError::Deserialization { .. }));
    }

    #[test]
    fn test_empty_data_file_reads_as_none() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let id = identity_of("/work/a.rs");
        fs::write(store.data_path(id), b"  \n").unwrap();

        assert!(store.load_events(id).unwrap().is_none());
    }

    #[test]
    fn test_list_documents() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let a = identity_of("/work/a.rs");
        let b = identity_of("/work/b.rs");

        store.save_header_if_absent(a, &header("h")).unwrap();
        store.save_events(a, &events(1)).unwrap();
        store.save_events(b, &events(1)).unwrap();
        fs::write(dir.path().join("README"), b"ignored").unwrap();
        fs::write(dir.path().join("zz.data"), b"[]").unwrap();

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(store.list_documents().unwrap(), expected);
    }
}
