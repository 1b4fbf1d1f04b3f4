//! Edit script → edit event.
//!
//! Added text wins: when a single observed change both adds and removes
//! text, only the insertion is reported and the removal is dropped. The
//! persisted history is consumed downstream in exactly this shape, so the
//! collapse is kept as-is even though it loses information (a selection
//! replaced by typing shows up as a plain insert).

use chrono::{DateTime, Utc};

use crate::diff::EditScript;
use crate::{CursorPosition, EditEvent};

/// Build at most one event from `script`.
///
/// Kept spans are ignored. Returns `None` when nothing was added or removed.
pub fn translate(
    script: &EditScript,
    position: CursorPosition,
    now: DateTime<Utc>,
) -> Option<EditEvent> {
    if script.is_unchanged() {
        return None;
    }

    let added = script.added_text();
    if !added.is_empty() {
        return Some(EditEvent::insert(added, position, now));
    }

    let removed = script.removed_text();
    if !removed.is_empty() {
        return Some(EditEvent::remove(removed, position, now));
    }

    None
}
