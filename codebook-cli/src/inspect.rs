//! Read-only views over a store.

use std::io::Write;

use anyhow::{Context, Result};
use codebook_capture::{EventStore, FileStore};
use codebook_core::{identity_of, EditAction, EditEvent};

/// Print the header and events recorded for `path`.
pub fn show(store: &FileStore, path: &str, out: &mut impl Write) -> Result<()> {
    let id = identity_of(path);
    writeln!(out, "document {id}")?;

    match store.load_header(id)? {
        Some(header) => writeln!(
            out,
            "  first seen by {}@{} ({}) as {}",
            header.user, header.host, header.ip, header.file
        )?,
        None => writeln!(out, "  no header")?,
    }

    let events = store.load_events(id)?.unwrap_or_default();
    writeln!(out, "  {} events", events.len())?;
    for event in &events {
        writeln!(out, "  {}", format_event(event))?;
    }
    Ok(())
}

/// One line per stored document: id, event count, original path.
pub fn list(store: &FileStore, out: &mut impl Write) -> Result<()> {
    let ids = store
        .list_documents()
        .with_context(|| format!("Failed to list {}", store.root().display()))?;

    for id in ids {
        let file = match store.load_header(id) {
            Ok(Some(header)) => header.file,
            Ok(None) => "-".to_string(),
            Err(e) => format!("<{e}>"),
        };
        let count = match store.load_events(id) {
            Ok(events) => events.map_or(0, |e| e.len()).to_string(),
            Err(_) => "corrupt".to_string(),
        };
        writeln!(out, "{id}  {count:>7}  {file}")?;
    }
    Ok(())
}

fn format_event(event: &EditEvent) -> String {
    let sign = match event.action {
        EditAction::Insert => '+',
        EditAction::Remove => '-',
    };
    format!(
        "{} {sign} {}:{} {:?}",
        event.timestamp.to_rfc3339(),
        event.position.line,
        event.position.column,
        event.value
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use codebook_core::{CursorPosition, SessionHeader};
    use tempfile::tempdir;

    #[test]
    fn test_show_prints_header_and_events() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let id = identity_of("/w/a.rs");
        store
            .save_header_if_absent(
                id,
                &SessionHeader {
                    user: "dev".into(),
                    host: "box".into(),
                    ip: "10.0.0.2".into(),
                    file: "/w/a.rs".into(),
                },
            )
            .unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        store
            .save_events(id, &[EditEvent::remove("x", CursorPosition::new(4, 1, 2), ts)])
            .unwrap();

        let mut out = Vec::new();
        show(&store, "/w/a.rs", &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("dev@box (10.0.0.2) as /w/a.rs"));
        assert!(text.contains("1 events"));
        assert!(text.contains("- 1:2 \"x\""));
    }

    #[test]
    fn test_list_marks_corrupt_logs() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let id = identity_of("/w/a.rs");
        std::fs::write(store.data_path(id), b"[oops").unwrap();

        let mut out = Vec::new();
        list(&store, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with(&id.to_string()));
        assert!(text.contains("corrupt"));
    }
}
