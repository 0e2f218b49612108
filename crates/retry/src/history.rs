//! Bounded, append-only record of operation errors.
//!
//! The history keeps the *earliest* errors of a retry loop. Once the capacity
//! is reached, further errors are refused and only counted, so the context of
//! the first failures is never displaced by later ones. The most recent
//! refused error is still held on the side so callers can always reach the
//! final failure.

use std::slice;

use crate::constants::MAX_ERROR_HISTORY;

/// Fixed-capacity error history owned by a single retry loop
#[derive(Debug, Clone)]
pub struct ErrorHistory<E> {
    entries: Vec<E>,
    capacity: usize,
    dropped: usize,
    last_only: bool,
    /// Most recent error that did not fit into `entries`
    latest_overflow: Option<E>,
}

impl<E> Default for ErrorHistory<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> ErrorHistory<E> {
    /// Create a history bounded by [`MAX_ERROR_HISTORY`]
    pub fn new() -> Self {
        Self::with_capacity(MAX_ERROR_HISTORY)
    }

    /// Create a history with a custom bound (at least one entry)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
            dropped: 0,
            last_only: false,
            latest_overflow: None,
        }
    }

    /// Create a single-slot history that always holds the most recent error
    pub fn last_error_only() -> Self {
        Self { last_only: true, ..Self::with_capacity(1) }
    }

    /// Record an error.
    ///
    /// Returns `true` when the error landed in the ordered entries, `false`
    /// when it was refused because the history is full.
    pub fn record(&mut self, error: E) -> bool {
        if self.last_only {
            self.dropped += self.entries.len();
            self.entries.clear();
            self.entries.push(error);
            return true;
        }

        if self.entries.len() < self.capacity {
            self.entries.push(error);
            true
        } else {
            self.dropped += 1;
            self.latest_overflow = Some(error);
            false
        }
    }

    /// Recorded errors in the order they occurred
    pub fn as_slice(&self) -> &[E] {
        &self.entries
    }

    /// Iterate over the recorded errors
    pub fn iter(&self) -> slice::Iter<'_, E> {
        self.entries.iter()
    }

    /// Number of recorded errors (never above the capacity)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no error has been recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of errors observed but not kept
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Maximum number of entries this history keeps
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether only the most recent error is kept
    pub fn is_last_error_only(&self) -> bool {
        self.last_only
    }

    /// The most recent error observed, recorded or not
    pub fn last(&self) -> Option<&E> {
        self.latest_overflow.as_ref().or_else(|| self.entries.last())
    }

    /// Consume the history and return the most recent error observed
    pub fn into_last(mut self) -> Option<E> {
        self.latest_overflow.take().or_else(|| self.entries.pop())
    }

    /// Consume the history and return the recorded errors
    pub fn into_vec(self) -> Vec<E> {
        self.entries
    }
}

impl<'a, E> IntoIterator for &'a ErrorHistory<E> {
    type Item = &'a E;
    type IntoIter = slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the bounded error history.
    use super::*;

    #[test]
    fn test_records_in_order() {
        let mut history = ErrorHistory::new();
        assert!(history.record("first"));
        assert!(history.record("second"));

        assert_eq!(history.as_slice(), &["first", "second"]);
        assert_eq!(history.last(), Some(&"second"));
        assert_eq!(history.dropped(), 0);
    }

    /// Once full, new errors are refused and counted instead of evicting the
    /// earliest entries.
    #[test]
    fn test_overflow_keeps_earliest_entries() {
        let mut history = ErrorHistory::with_capacity(3);
        for i in 0..10 {
            history.record(i);
        }

        assert_eq!(history.len(), 3);
        assert_eq!(history.as_slice(), &[0, 1, 2]);
        assert_eq!(history.dropped(), 7);
        assert_eq!(history.last(), Some(&9));
        assert_eq!(history.into_last(), Some(9));
    }

    #[test]
    fn test_default_capacity_is_bounded() {
        let mut history = ErrorHistory::new();
        for i in 0..(MAX_ERROR_HISTORY + 250) {
            history.record(i);
        }

        assert_eq!(history.len(), MAX_ERROR_HISTORY);
        assert_eq!(history.capacity(), MAX_ERROR_HISTORY);
        assert_eq!(history.dropped(), 250);
    }

    #[test]
    fn test_last_error_only_overwrites_single_slot() {
        let mut history = ErrorHistory::last_error_only();
        history.record("a");
        history.record("b");
        history.record("c");

        assert!(history.is_last_error_only());
        assert_eq!(history.as_slice(), &["c"]);
        assert_eq!(history.dropped(), 2);
        assert_eq!(history.into_last(), Some("c"));
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let mut history = ErrorHistory::with_capacity(0);
        assert!(history.record(1));
        assert!(!history.record(2));
        assert_eq!(history.into_vec(), vec![1]);
    }

    #[test]
    fn test_empty_history() {
        let history: ErrorHistory<String> = ErrorHistory::default();
        assert!(history.is_empty());
        assert_eq!(history.last(), None);
        assert_eq!(history.into_last(), None);
    }
}
