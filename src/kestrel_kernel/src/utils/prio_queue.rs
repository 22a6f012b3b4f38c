//! Priority queue with FIFO ordering among equal priorities
use std::{collections::BTreeMap, fmt, ops::RangeTo};

use kestrel_core::kernel::Priority;

/// Identifies an entry in [`PrioQueue`]. Can be used to remove the entry
/// from the middle of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct QueueKey {
    // Field order matters: the derived `Ord` sorts by priority first
    priority: Priority,
    seq: u64,
}

/// A queue sorted by `(priority, arrival order)`.
///
/// Entries with a numerically smaller priority come first. Entries with
/// identical priorities are served in the order they were inserted.
pub(crate) struct PrioQueue<T> {
    entries: BTreeMap<QueueKey, T>,
    next_seq: u64,
}

impl<T> PrioQueue<T> {
    pub(crate) const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Insert `value` behind every entry whose priority is equal to or more
    /// urgent than `priority`.
    pub(crate) fn push_back(&mut self, priority: Priority, value: T) -> QueueKey {
        let key = QueueKey {
            priority,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.entries.insert(key, value);
        key
    }

    /// Remove and return the entry at the front.
    pub(crate) fn pop_front(&mut self) -> Option<T> {
        self.entries.pop_first().map(|(_, value)| value)
    }

    /// Get the entry at the front without removing it.
    pub(crate) fn front(&self) -> Option<(QueueKey, &T)> {
        self.entries.first_key_value().map(|(&key, value)| (key, value))
    }

    /// Remove the entry identified by `key`. Returns `None` if it has already
    /// been removed.
    pub(crate) fn remove(&mut self, key: QueueKey) -> Option<T> {
        self.entries.remove(&key)
    }

    /// Return a flag indicating whether there's an entry whose priority is in
    /// the specified range.
    pub(crate) fn has_entry_in_priority_range(&self, range: RangeTo<Priority>) -> bool {
        self.front()
            .map_or(false, |(key, _)| key.priority < range.end)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate over the entries in the serving order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.entries.values()
    }
}

impl<T: fmt::Debug> fmt::Debug for PrioQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(key, value)| (key.priority, value)))
            .finish()
    }
}
