//! Bounded command history with recall by index or substring.

use std::collections::VecDeque;

/// Default number of entries retained per session.
pub const DEFAULT_CAPACITY: usize = 32;

/// A bounded FIFO of prior input lines.
///
/// Consecutive duplicates (compared case-insensitively) are suppressed;
/// the oldest entry is evicted on overflow. Recall indices are 1-based
/// and count from the oldest retained entry, matching what the `history`
/// listing displays.
#[derive(Debug)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a line. Skips an exact case-insensitive repeat of the
    /// immediately preceding entry.
    pub fn push(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        if let Some(last) = self.entries.back()
            && last.eq_ignore_ascii_case(line)
        {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line.to_string());
    }

    /// Entry by 1-based index, oldest first.
    pub fn recall_index(&self, index: usize) -> Option<&str> {
        if index == 0 {
            return None;
        }
        self.entries.get(index - 1).map(String::as_str)
    }

    /// Most recent entry containing `needle`.
    pub fn recall_substring(&self, needle: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.contains(needle))
            .map(String::as_str)
    }

    /// Entry by position for history navigation (0 = oldest).
    pub fn get(&self, pos: usize) -> Option<&str> {
        self.entries.get(pos).map(String::as_str)
    }

    /// Numbered listing, one entry per line.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for (i, entry) in self.entries.iter().enumerate() {
            out.push_str(&format!("  {:4}  {entry}\r\n", i + 1));
        }
        out
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
