// ============================================================================
// Entity Retirement Library
// ============================================================================

pub mod config;
pub mod core;
pub mod retirement;
pub mod soak;

// Re-export main types for convenience
pub use config::{RetirementConfig, UniversalKeyPolicy};
pub use core::{ConcurrencyKey, ContractViolation, RegistrationSeq, Result, RetirementError};
pub use retirement::{
    KeyBacklog, NotifyRetiree, RetireFuture, Retiree, RetirementLedger, RetirementManager,
    RetirementStats, retired,
};
pub use soak::{SoakConfig, SoakReport, run_soak};

/// Retirement manager keyed by message id, retiring through boxed closures.
///
/// # Examples
///
/// ```
/// use entity_retirement::{MessageRetirementManager, retired};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = MessageRetirementManager::new();
///
/// manager.register(1, 7, Box::new(retired))?;
/// manager.register(2, 7, Box::new(retired))?;
///
/// // Message 2 finishes first but stays queued behind message 1.
/// assert!(manager.complete(&2)?.is_empty());
/// assert_eq!(manager.complete(&1)?.len(), 2);
/// # Ok(())
/// # }
/// ```
pub type MessageRetirementManager =
    RetirementManager<u64, Box<dyn FnOnce() -> RetireFuture + Send + 'static>>;
