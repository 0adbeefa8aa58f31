//! Bounded history of formatted metadata records.

use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// FIFO of the most recent formatted records, bounded at `capacity`.
///
/// Appends past the bound evict the oldest entry; survivors keep their
/// relative order. Single-writer/single-reader: the state owner serializes
/// all access, so no interior locking here.
#[derive(Clone, Debug)]
pub struct MetadataHistory {
    entries: VecDeque<String>,
    capacity: usize,
}

impl MetadataHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn append(&mut self, text: String) {
        self.entries.push_back(text);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Current entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MetadataHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
