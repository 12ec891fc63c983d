use crate::core::ConcurrencyKey;
use serde::Serialize;

/// Point-in-time counters for the retirement ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetirementStats {
    pub registered_total: u64,
    pub retired_total: u64,
    /// Registered and not yet retired
    pub pending: usize,
    /// Finished executing but still waiting on ordering, holds or deferrals
    pub completed_pending: usize,
    pub held: usize,
    pub blocked_by_deferral: usize,
    /// Waiting on a target that is not registered: not dispatched yet, or
    /// already retired before the deferral was added
    pub blocked_on_unregistered: usize,
    pub pending_deferral_edges: usize,
    /// Keys with a non-empty queue
    pub keys: usize,
}

impl RetirementStats {
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.pending_deferral_edges == 0
    }
}

/// Queue state of one key, used to diagnose stalled keys.
///
/// A key whose head stays incomplete is waiting on an invocation that never
/// signaled completion; nothing behind it will retire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyBacklog {
    pub key: ConcurrencyKey,
    pub depth: usize,
    pub head_completed: bool,
    pub head_held: bool,
    pub head_deferred: bool,
    pub head_waiting_on_unregistered: bool,
}
