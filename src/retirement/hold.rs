use std::collections::HashMap;
use std::hash::Hash;

/// Reference-counted vetoes on retirement, independent of completion.
#[derive(Debug)]
pub struct HoldTable<M> {
    counts: HashMap<M, u32>,
}

impl<M> Default for HoldTable<M> {
    fn default() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }
}

impl<M: Eq + Hash + Clone> HoldTable<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the hold count after incrementing.
    pub fn hold(&mut self, message: &M) -> u32 {
        let count = self.counts.entry(message.clone()).or_insert(0);
        *count += 1;
        *count
    }

    /// Returns the remaining count, or `None` if there was nothing to release.
    pub fn release(&mut self, message: &M) -> Option<u32> {
        let count = self.counts.get_mut(message)?;
        *count -= 1;
        let remaining = *count;
        if remaining == 0 {
            self.counts.remove(message);
        }
        Some(remaining)
    }

    pub fn count(&self, message: &M) -> u32 {
        self.counts.get(message).copied().unwrap_or(0)
    }

    pub fn is_held(&self, message: &M) -> bool {
        self.count(message) > 0
    }

    pub fn forget(&mut self, message: &M) {
        self.counts.remove(message);
    }

    /// Number of messages with at least one outstanding hold.
    pub fn held_messages(&self) -> usize {
        self.counts.len()
    }
}
