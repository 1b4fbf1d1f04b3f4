//! Host editor interface.
//!
//! The recorder never talks to a concrete editor. It needs the current
//! document's path, full text and cursor on demand, plus a stream of
//! [`Notification`]s delivered one at a time.

use codebook_core::CursorPosition;
use serde::{Deserialize, Serialize};

/// Scintilla's "painted" notification: UI only, never a content change.
pub const UI_ONLY_CODE: i32 = 2013;

/// What the recorder may ask the host about the focused document.
///
/// `None` means the host could not answer (no document focused, payload
/// missing); the recorder then records nothing for that notification.
pub trait HostEditor {
    fn current_document_path(&self) -> Option<String>;
    fn current_full_text(&self) -> Option<String>;
    fn current_cursor(&self) -> Option<CursorPosition>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Open,
    Activate,
    Close,
    Changed,
}

/// Lifecycle or content notification from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    /// Host-specific notification code; [`UI_ONLY_CODE`] marks UI-only events
    #[serde(default)]
    pub code: i32,
    /// Document the lifecycle notification refers to, when the host says
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Notification {
    pub fn open(path: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Open,
            code: 0,
            path: Some(path.into()),
        }
    }

    pub fn activate(path: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Activate,
            code: 0,
            path: Some(path.into()),
        }
    }

    pub fn close(path: Option<String>) -> Self {
        Self {
            kind: NotificationKind::Close,
            code: 0,
            path,
        }
    }

    pub fn changed(code: i32) -> Self {
        Self {
            kind: NotificationKind::Changed,
            code,
            path: None,
        }
    }
}

/// In-memory host: holds one focused document's path, text and cursor.
///
/// Drives the recorder headlessly (scripted replays, tests).
#[derive(Debug, Clone, Default)]
pub struct BufferHost {
    path: Option<String>,
    text: Option<String>,
    cursor: Option<CursorPosition>,
}

impl BufferHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Focus `path` with `text`; the cursor moves to the start.
    pub fn focus(&mut self, path: impl Into<String>, text: impl Into<String>) {
        self.path = Some(path.into());
        self.text = Some(text.into());
        self.cursor = Some(CursorPosition::default());
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }

    pub fn set_cursor(&mut self, cursor: Option<CursorPosition>) {
        self.cursor = cursor;
    }

    /// Put the cursor at char `offset`, deriving line and column from the text.
    pub fn move_to(&mut self, offset: usize) {
        let text = self.text.as_deref().unwrap_or_default();
        self.cursor = Some(cursor_at(text, offset));
    }

    pub fn unfocus(&mut self) {
        *self = Self::default();
    }
}

impl HostEditor for BufferHost {
    fn current_document_path(&self) -> Option<String> {
        self.path.clone()
    }

    fn current_full_text(&self) -> Option<String> {
        self.text.clone()
    }

    fn current_cursor(&self) -> Option<CursorPosition> {
        self.cursor
    }
}

/// Line/column of char `offset` in `text`, clamped to the end.
pub fn cursor_at(text: &str, offset: usize) -> CursorPosition {
    let mut line = 0;
    let mut column = 0;
    let mut seen = 0;
    for c in text.chars().take(offset) {
        seen += 1;
        if c == '\n' {
            line += 1;
            column = 0;
        } else {
            column += 1;
        }
    }
    CursorPosition::new(seen, line, column)
}
