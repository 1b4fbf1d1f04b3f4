//! Append-only, per-document edit history.
//!
//! The in-memory log is the source of truth; storage is a lagging mirror
//! refreshed by flushes. The log remembers how many of its leading events
//! are known to be in storage (loaded from it or written by a flush);
//! everything after that prefix is pending and drives the flush policy.

use codebook_core::EditEvent;

#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<EditEvent>,
    /// Leading events that mirror the stored record
    durable: usize,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log hydrated from storage; nothing is pending.
    pub fn from_persisted(events: Vec<EditEvent>) -> Self {
        let durable = events.len();
        Self { events, durable }
    }

    /// Append one event. Returns the pending count afterwards.
    pub fn append(&mut self, event: EditEvent) -> usize {
        self.events.push(event);
        self.pending()
    }

    /// Merge a persisted log into this one without replacing it.
    ///
    /// If memory already starts with `persisted`, storage is just lagging
    /// and nothing changes. If `persisted` extends the durable prefix, its
    /// extra events are adopted ahead of the pending ones. Otherwise the
    /// stored log was never seen here and goes in front of everything in
    /// memory. Returns the number of events adopted.
    pub fn hydrate(&mut self, persisted: Vec<EditEvent>) -> usize {
        if self.events.starts_with(&persisted) {
            return 0;
        }

        let known = if persisted.starts_with(&self.events[..self.durable]) {
            self.durable
        } else {
            0
        };
        let local = self.events.split_off(known);
        let adopted = persisted.len() - known;

        self.events = persisted;
        self.durable = self.events.len();
        self.events.extend(local);
        adopted
    }

    pub fn events(&self) -> &[EditEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events appended since the stored record was last known complete.
    pub fn pending(&self) -> usize {
        self.events.len() - self.durable
    }

    /// Record that the full log is now durable.
    pub fn mark_flushed(&mut self) {
        self.durable = self.events.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use codebook_core::CursorPosition;

    fn event(value: &str) -> EditEvent {
        EditEvent::insert(value, CursorPosition::default(), Utc::now())
    }

    #[test]
    fn test_append_tracks_pending() {
        let mut log = EventLog::new();
        assert_eq!(log.append(event("a")), 1);
        assert_eq!(log.append(event("b")), 2);
        assert_eq!(log.len(), 2);

        log.mark_flushed();
        assert_eq!(log.pending(), 0);
        assert_eq!(log.append(event("c")), 1);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_hydrate_empty_log_adopts_everything() {
        let persisted = vec![event("a"), event("b")];
        let mut log = EventLog::new();

        assert_eq!(log.hydrate(persisted.clone()), 2);
        assert_eq!(log.events(), persisted.as_slice());
        assert_eq!(log.pending(), 0);
    }

    #[test]
    fn test_hydrate_keeps_newer_memory() {
        let a = event("a");
        let b = event("b");
        let mut log = EventLog::from_persisted(vec![a.clone()]);
        log.append(b.clone());

        // Storage lags: only `a` was flushed
        assert_eq!(log.hydrate(vec![a.clone()]), 0);
        assert_eq!(log.events(), &[a, b]);
        assert_eq!(log.pending(), 1);
    }

    #[test]
    fn test_hydrate_extends_with_unseen_tail() {
        let a = event("a");
        let b = event("b");
        let c = event("c");
        let mut log = EventLog::from_persisted(vec![a.clone()]);

        assert_eq!(log.hydrate(vec![a.clone(), b.clone(), c.clone()]), 2);
        assert_eq!(log.events(), &[a, b, c]);
    }

    #[test]
    fn test_hydrate_puts_unseen_log_before_unsaved_events() {
        let a = event("a");
        let b = event("b");
        let c = event("c");
        let typed = event("abc");

        // Recorded before the stored log was ever read
        let mut log = EventLog::new();
        log.append(typed.clone());

        assert_eq!(log.hydrate(vec![a.clone(), b.clone(), c.clone()]), 3);
        assert_eq!(log.events(), &[a, b, c, typed]);
        assert_eq!(log.pending(), 1);
    }

    #[test]
    fn test_hydrate_keeps_pending_after_adopted_tail() {
        let a = event("a");
        let b = event("b");
        let local = event("local");
        let mut log = EventLog::from_persisted(vec![a.clone()]);
        log.append(local.clone());

        // Another writer extended the record past what this log loaded
        assert_eq!(log.hydrate(vec![a.clone(), b.clone()]), 1);
        assert_eq!(log.events(), &[a, b, local]);
        assert_eq!(log.pending(), 1);
    }

    #[test]
    fn test_hydrate_is_idempotent() {
        let persisted = vec![event("a"), event("b")];
        let mut log = EventLog::new();
        log.hydrate(persisted.clone());
        log.hydrate(persisted.clone());
        assert_eq!(log.len(), 2);
    }
}
