use crate::types::{FeedItem, MAX_TIP_SIZE};
use std::collections::VecDeque;

/// The most recently seen fullnames, newest at the front.
///
/// The front is the cursor for "everything newer than this". The rest of the
/// window is history to fall back on when the front post disappears. An empty
/// string at the front means there is no trustworthy cursor and the next fetch
/// should be broad. The window is never empty.
#[derive(Debug, Clone)]
pub struct TipWindow {
    entries: VecDeque<String>,
    capacity: usize,
}

// Never empty: the placeholder stands in when there is no history.
#[allow(clippy::len_without_is_empty)]
impl TipWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut entries = VecDeque::with_capacity(capacity + 1);
        entries.push_back(String::new());
        Self { entries, capacity }
    }

    /// Current cursor.
    pub fn front(&self) -> &str {
        self.entries.front().map(String::as_str).unwrap_or("")
    }

    pub fn is_placeholder(&self) -> bool {
        self.front().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, name: &str) -> bool {
        !name.is_empty() && self.entries.iter().any(|entry| entry == name)
    }

    /// Fullnames front to back, placeholder excluded.
    pub fn ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| !entry.is_empty())
            .cloned()
            .collect()
    }

    /// Fold a newest-first batch into the window.
    ///
    /// Items are pushed oldest first so the newest one ends up at the front.
    /// Items without a fullname are skipped; `""` is reserved for the
    /// placeholder.
    pub fn absorb_new_items(&mut self, items: &[FeedItem]) {
        for item in items.iter().rev().filter(|item| !item.name.is_empty()) {
            self.push_front(item.name.clone());
        }
    }

    /// Drop the current cursor and promote the next entry, falling back to
    /// the placeholder once nothing is left. Returns the dropped fullname.
    pub fn evict_front(&mut self) -> Option<String> {
        let evicted = self.entries.pop_front().filter(|name| !name.is_empty());
        if self.entries.is_empty() {
            self.entries.push_back(String::new());
        }
        evicted
    }

    fn push_front(&mut self, name: String) {
        // A real cursor supersedes the placeholder.
        if self.entries.len() == 1 && self.is_placeholder() {
            self.entries.clear();
        }
        self.entries.push_front(name);
        while self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }
}

impl Default for TipWindow {
    fn default() -> Self {
        Self::new(MAX_TIP_SIZE)
    }
}
