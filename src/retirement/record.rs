use crate::core::{ConcurrencyKey, RegistrationSeq};

/// Per-message bookkeeping, alive from registration until retirement.
///
/// Hold counts and deferral edges are kept in their own tables, keyed by the
/// message, so that edges can exist before the record does.
#[derive(Debug)]
pub struct RetirementRecord<M, R> {
    message: M,
    key: ConcurrencyKey,
    seq: RegistrationSeq,
    retiree: R,
    completed: bool,
}

impl<M, R> RetirementRecord<M, R> {
    pub fn new(message: M, key: ConcurrencyKey, seq: RegistrationSeq, retiree: R) -> Self {
        Self {
            message,
            key,
            seq,
            retiree,
            completed: false,
        }
    }

    pub fn message(&self) -> &M {
        &self.message
    }

    pub fn key(&self) -> ConcurrencyKey {
        self.key
    }

    pub fn seq(&self) -> RegistrationSeq {
        self.seq
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Returns true the first time execution is reported finished.
    pub fn mark_completed(&mut self) -> bool {
        let first = !self.completed;
        self.completed = true;
        first
    }

    pub fn into_parts(self) -> (M, R) {
        (self.message, self.retiree)
    }
}
