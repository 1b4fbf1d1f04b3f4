//! Flush scheduling.
//!
//! A document's log is written out whenever its pending count reaches a
//! positive multiple of the threshold, and every tracked log is written on
//! any document close. A flush always writes the complete log, so a failed
//! flush loses nothing: `pending` keeps growing and the next multiple (or
//! the next close) retries with the larger log.

use codebook_core::DocumentId;

use crate::storage::StoreError;

/// Default number of appended events between threshold flushes.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    /// 0 disables threshold flushing
    threshold: usize,
}

impl FlushPolicy {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    /// Only close/shutdown flush.
    pub fn on_close_only() -> Self {
        Self::new(0)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Whether a log with `pending` unflushed events should be written now.
    pub fn should_flush(&self, pending: usize) -> bool {
        self.threshold > 0 && pending > 0 && pending % self.threshold == 0
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_THRESHOLD)
    }
}

/// Outcome of flushing several documents.
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Documents written, with the number of events each record now holds
    pub flushed: Vec<(DocumentId, usize)>,
    pub failed: Vec<(DocumentId, StoreError)>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total events across every written record.
    pub fn events_written(&self) -> usize {
        self.flushed.iter().map(|(_, n)| n).sum()
    }
}
