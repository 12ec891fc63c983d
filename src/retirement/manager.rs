// ============================================================================
// Retirement Manager
// ============================================================================

use super::ledger::RetirementLedger;
use super::retiree::Retiree;
use super::stats::{KeyBacklog, RetirementStats};
use crate::config::RetirementConfig;
use crate::core::{ConcurrencyKey, ContractViolation, Result};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use tracing::{error, warn};

/// Thread-safe retirement manager shared by the pipeline's worker threads.
///
/// All bookkeeping happens under one lock since deferral edges span keys.
/// Retirees are handed back to the caller (or run by [`retire_message`])
/// after the lock is released, so a retiree may call back into the manager.
///
/// Contract violations panic after being logged. Lock poisoning is reported
/// as [`RetirementError::LockError`].
///
/// [`retire_message`]: RetirementManager::retire_message
/// [`RetirementError::LockError`]: crate::core::RetirementError::LockError
pub struct RetirementManager<M, R> {
    ledger: Mutex<RetirementLedger<M, R>>,
    config: RetirementConfig,
}

impl<M, R> RetirementManager<M, R>
where
    M: Eq + Hash + Clone + Debug,
{
    pub fn new() -> Self {
        let config = RetirementConfig::default();
        Self {
            ledger: Mutex::new(RetirementLedger::new(config.universal_key_policy)),
            config,
        }
    }

    pub fn with_config(config: RetirementConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ledger: Mutex::new(RetirementLedger::new(config.universal_key_policy)),
            config,
        })
    }

    pub fn config(&self) -> &RetirementConfig {
        &self.config
    }

    /// Registers `message` on `key` when its dispatch begins.
    pub fn register(&self, message: M, key: impl Into<ConcurrencyKey>, retiree: R) -> Result<()> {
        let key = key.into();
        let outcome = {
            let mut ledger = self.lock()?;
            ledger
                .register(message, key, retiree)
                .map(|_| ledger.queue_depth(key))
        };
        let depth = self.enforce(outcome);

        let threshold = self.config.backlog_warn_depth;
        if threshold > 0 && depth == threshold + 1 {
            warn!(%key, depth, threshold, "retirement backlog exceeds threshold");
        }
        Ok(())
    }

    /// `source` may not retire before `target` has retired.
    ///
    /// Retired messages are not remembered: deferring to one stalls `source`
    /// until that id registers and retires again. See
    /// [`RetirementLedger::defer`].
    pub fn defer(&self, source: M, target: M) -> Result<()> {
        let outcome = self.lock()?.defer(source, target);
        self.enforce(outcome);
        Ok(())
    }

    pub fn hold(&self, message: &M) -> Result<()> {
        let outcome = self.lock()?.hold(message);
        self.enforce(outcome);
        Ok(())
    }

    /// Returns true when the last hold was dropped on an already completed
    /// message; the caller should then signal completion again.
    pub fn release(&self, message: &M) -> Result<bool> {
        let outcome = self.lock()?.release(message);
        Ok(self.enforce(outcome))
    }

    /// Signals that execution of `message` finished. The caller must retire
    /// the returned handles in the returned order.
    pub fn complete(&self, message: &M) -> Result<Vec<R>> {
        let outcome = self.lock()?.complete(message);
        Ok(self.enforce(outcome))
    }

    pub fn is_retireable(&self, message: &M) -> Result<bool> {
        let outcome = self.lock()?.is_retireable(message);
        Ok(self.enforce(outcome))
    }

    pub fn is_registered(&self, message: &M) -> Result<bool> {
        Ok(self.lock()?.is_registered(message))
    }

    pub fn stats(&self) -> Result<RetirementStats> {
        Ok(self.lock()?.stats())
    }

    pub fn backlog(&self) -> Result<Vec<KeyBacklog>> {
        Ok(self.lock()?.backlog())
    }

    fn lock(&self) -> Result<MutexGuard<'_, RetirementLedger<M, R>>> {
        Ok(self.ledger.lock()?)
    }

    /// Callers drop the guard before this runs, so a violation never poisons
    /// the lock for the other keys.
    fn enforce<T>(&self, outcome: std::result::Result<T, ContractViolation>) -> T {
        match outcome {
            Ok(value) => value,
            Err(violation) => {
                error!(%violation, "retirement contract violated");
                panic!("retirement contract violated: {}", violation);
            }
        }
    }
}

impl<M, R> RetirementManager<M, R>
where
    M: Eq + Hash + Clone + Debug,
    R: Retiree,
{
    /// Signals completion and retires everything that became retireable.
    ///
    /// Each retiree's future is awaited before the next retiree runs, so
    /// completion notices are observed in retirement order. Returns how many
    /// messages retired.
    pub async fn retire_message(&self, message: &M) -> Result<usize> {
        let retirees = self.complete(message)?;
        let retired = retirees.len();
        for retiree in retirees {
            retiree.retire().await;
        }
        Ok(retired)
    }
}

impl<M, R> Default for RetirementManager<M, R>
where
    M: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}
