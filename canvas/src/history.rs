//! Linear undo/redo ledger over committed-shape snapshots.
//!
//! DESIGN
//! ======
//! Entries form one sequence with a pointer into it. Recording while the
//! pointer is behind the end prunes the redo branch first. The stack is
//! bounded: once `capacity` entries are held, recording evicts the oldest.
//! Step numbers keep increasing across evictions so callers can tell
//! snapshots apart even after the front of the ledger is gone.

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;

use std::collections::VecDeque;

use crate::consts::HISTORY_CAPACITY;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry<T> {
    pub step: u64,
    pub snapshot: T,
}

#[derive(Debug, Clone)]
pub struct HistoryStack<T> {
    entries: VecDeque<HistoryEntry<T>>,
    pointer: usize,
    next_step: u64,
    capacity: usize,
}

impl<T: Clone> Default for HistoryStack<T> {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl<T: Clone> HistoryStack<T> {
    /// A capacity of zero is treated as one; the current snapshot is always kept.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: VecDeque::with_capacity(capacity.min(HISTORY_CAPACITY)), pointer: 0, next_step: 0, capacity }
    }

    /// Append `snapshot` after the pointer and move the pointer onto it.
    pub fn record(&mut self, snapshot: T) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.pointer + 1);
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry { step: self.next_step, snapshot });
        self.next_step += 1;
        self.pointer = self.entries.len() - 1;
    }

    /// Step back one entry and return its snapshot.
    pub fn undo(&mut self) -> Option<T> {
        if !self.can_undo() {
            return None;
        }
        self.pointer -= 1;
        self.entries.get(self.pointer).map(|entry| entry.snapshot.clone())
    }

    /// Step forward one entry and return its snapshot.
    pub fn redo(&mut self) -> Option<T> {
        if !self.can_redo() {
            return None;
        }
        self.pointer += 1;
        self.entries.get(self.pointer).map(|entry| entry.snapshot.clone())
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.pointer > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.pointer + 1 < self.entries.len()
    }

    /// Entry under the pointer.
    #[must_use]
    pub fn current(&self) -> Option<&HistoryEntry<T>> {
        self.entries.get(self.pointer)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
