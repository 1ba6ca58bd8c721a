/*!
 * Deadline Registry
 * Per-context store of active timeout entries
 */

use std::time::Duration;

use crate::alarm;
use crate::core::types::{TimeoutEntry, TimeoutId};

/// Store of the active timeout entries belonging to one execution context
///
/// Entries nest but are not removed in strict LIFO order: an expired entry
/// stays pending until its own scope guard removes it after the raised error
/// has been caught. Nesting depth is small in practice, so a plain vector
/// beats an ordered map here.
#[derive(Debug, Default)]
pub(crate) struct DeadlineRegistry {
    entries: Vec<TimeoutEntry>,
    next_seq: u64,
}

impl DeadlineRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    /// Register an entry, stamping its insertion order
    pub(crate) fn add(&mut self, mut entry: TimeoutEntry) {
        entry.set_seq(self.next_seq);
        self.next_seq += 1;
        self.entries.push(entry);
    }

    /// Remove an entry by id; no-op if absent (the entry may already be
    /// logically consumed by an expiry that was caught upstream)
    pub(crate) fn remove(&mut self, id: TimeoutId) -> bool {
        match self.entries.iter().position(|entry| entry.id() == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Entry with the smallest deadline; ties break by insertion order
    /// (first registered wins) for determinism
    pub(crate) fn min_entry(&self) -> Option<&TimeoutEntry> {
        self.entries
            .iter()
            .min_by_key(|entry| (entry.deadline_ms(), entry.seq()))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Remaining time per pending entry, in registration order
    pub(crate) fn remaining_deadlines(&self) -> Vec<Duration> {
        let now = alarm::now_ms();
        self.entries.iter().map(|entry| entry.remaining(now)).collect()
    }
}
