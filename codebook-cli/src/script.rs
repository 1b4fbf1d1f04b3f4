//! Scripted notification replay.
//!
//! A script is JSON Lines, one notification per line. Content lines carry
//! the full document text the host would report at that moment:
//!
//! ```text
//! {"kind":"open","path":"/work/main.rs"}
//! {"kind":"changed","code":0,"text":"fn main() {}","cursor":{"pos":12,"l":0,"c":12}}
//! {"kind":"changed","code":2013}
//! {"kind":"close","path":"/work/main.rs"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. When `cursor` is
//! omitted on a line that sets `text`, the cursor moves to the end of the
//! new text. `at` (RFC 3339) pins the event timestamp.

use std::collections::HashSet;
use std::io::BufRead;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use codebook_capture::{BufferHost, Dispatched, HostEditor, Notification, NotificationKind, Recorder};
use codebook_core::{CursorPosition, DocumentId};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ScriptLine {
    kind: NotificationKind,
    #[serde(default)]
    code: i32,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    cursor: Option<CursorPosition>,
    #[serde(default)]
    at: Option<DateTime<Utc>>,
}

/// Totals for one replay.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub notifications: usize,
    pub recorded: usize,
    pub ignored: usize,
    pub documents: usize,
    /// Events on disk after the final flush
    pub flushed_events: usize,
    pub flush_failures: usize,
}

impl std::fmt::Display for ReplaySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Replayed {} notifications: {} events recorded ({} ignored) across {} documents, {} events flushed",
            self.notifications, self.recorded, self.ignored, self.documents, self.flushed_events
        )?;
        if self.flush_failures > 0 {
            write!(f, ", {} flush failures", self.flush_failures)?;
        }
        Ok(())
    }
}

/// Drive `recorder` through every notification in `input`, then shut it down.
pub fn replay(recorder: &Recorder, input: impl BufRead) -> Result<ReplaySummary> {
    let mut host = BufferHost::new();
    let mut summary = ReplaySummary::default();
    let mut documents: HashSet<DocumentId> = HashSet::new();

    for (index, line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("Failed to read script line {line_no}"))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let step: ScriptLine = serde_json::from_str(trimmed)
            .with_context(|| format!("Invalid notification on line {line_no}"))?;
        apply_to_host(&mut host, &step);

        let notification = Notification {
            kind: step.kind,
            code: step.code,
            path: step.path.clone(),
        };
        let outcome = match step.at {
            Some(at) => recorder.dispatch_at(&host, &notification, at),
            None => recorder.dispatch(&host, &notification),
        };
        summary.notifications += 1;

        match outcome {
            Dispatched::Opened(id) => {
                documents.insert(id);
            }
            Dispatched::Recorded(event) => {
                log::debug!("line {line_no}: {:?} {:?}", event.action, event.value);
                summary.recorded += 1;
            }
            Dispatched::Unchanged => {}
            Dispatched::Ignored => summary.ignored += 1,
            Dispatched::Closed(report) => {
                for (id, e) in &report.failed {
                    log::warn!("line {line_no}: flush of {id} failed: {e}");
                }
                if step.path.is_none() || step.path == host.current_document_path() {
                    host.unfocus();
                }
            }
        }
    }

    let report = recorder.shutdown();
    summary.documents = documents.len().max(recorder.tracked().len());
    summary.flushed_events = report.events_written();
    summary.flush_failures = report.failed.len();
    Ok(summary)
}

fn apply_to_host(host: &mut BufferHost, step: &ScriptLine) {
    if matches!(step.kind, NotificationKind::Open | NotificationKind::Activate) {
        if let Some(path) = &step.path {
            if host.current_document_path().as_deref() != Some(path.as_str()) {
                host.focus(path.clone(), step.text.clone().unwrap_or_default());
            }
        }
    }

    if let Some(text) = &step.text {
        host.set_text(text.clone());
        if step.cursor.is_none() {
            host.move_to(text.chars().count());
        }
    }
    if let Some(cursor) = step.cursor {
        host.set_cursor(Some(cursor));
    }
}
