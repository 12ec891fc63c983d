use crate::core::{ConcurrencyKey, RegistrationSeq};
use std::collections::{HashMap, VecDeque};

/// One FIFO of live records per concurrency key, in registration order.
#[derive(Debug, Default)]
pub struct KeyQueues {
    queues: HashMap<ConcurrencyKey, VecDeque<RegistrationSeq>>,
}

impl KeyQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends at the tail and returns the new depth of the key's queue.
    pub fn push(&mut self, key: ConcurrencyKey, seq: RegistrationSeq) -> usize {
        let queue = self.queues.entry(key).or_default();
        debug_assert!(queue.back().is_none_or(|last| *last < seq));
        queue.push_back(seq);
        queue.len()
    }

    /// Removes a retired record. Usually the head; a record that inherited
    /// an earlier waiter's position may leave from the middle.
    pub fn remove(&mut self, key: ConcurrencyKey, seq: RegistrationSeq) -> bool {
        let Some(queue) = self.queues.get_mut(&key) else {
            return false;
        };

        let removed = if queue.front() == Some(&seq) {
            queue.pop_front().is_some()
        } else {
            match queue.binary_search(&seq) {
                Ok(pos) => queue.remove(pos).is_some(),
                Err(_) => false,
            }
        };

        if queue.is_empty() {
            self.queues.remove(&key);
        }
        removed
    }

    pub fn head(&self, key: ConcurrencyKey) -> Option<RegistrationSeq> {
        self.queues.get(&key).and_then(|queue| queue.front().copied())
    }

    pub fn depth(&self, key: ConcurrencyKey) -> usize {
        self.queues.get(&key).map_or(0, VecDeque::len)
    }

    /// Records of `key` registered before `seq`, head first.
    pub fn before(
        &self,
        key: ConcurrencyKey,
        seq: RegistrationSeq,
    ) -> impl Iterator<Item = RegistrationSeq> + '_ {
        self.iter(key).take_while(move |earlier| *earlier < seq)
    }

    pub fn iter(&self, key: ConcurrencyKey) -> impl Iterator<Item = RegistrationSeq> + '_ {
        self.queues
            .get(&key)
            .into_iter()
            .flat_map(|queue| queue.iter().copied())
    }

    /// Keys with at least one live record, in ascending order.
    pub fn keys(&self) -> Vec<ConcurrencyKey> {
        let mut keys: Vec<ConcurrencyKey> = self.queues.keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn key_count(&self) -> usize {
        self.queues.len()
    }
}
