// ============================================================================
// Retirement Module
// ============================================================================
//
// Decides the exact moment a finished unit of work may be reported back to
// its caller ("retired"):
// - work runs concurrently across independent concurrency keys
// - within one key, completion visibility stays FIFO even when execution
//   finishes out of order
// - a message may defer its retirement until some other, possibly not yet
//   registered, message (on any key) has retired
//
// Components:
// - RetirementRecord: per-message bookkeeping
// - KeyQueues: one FIFO per concurrency key
// - DeferralGraph: "retire only after" edges
// - HoldTable: reference-counted vetoes
// - RetirementLedger: the resolution algorithm
// - RetirementManager: the locked, thread-safe entry point
//
// ============================================================================

pub mod deferral;
pub mod hold;
pub mod key_queue;
pub mod ledger;
pub mod manager;
pub mod record;
pub mod retiree;
pub mod stats;

pub use deferral::DeferralGraph;
pub use hold::HoldTable;
pub use key_queue::KeyQueues;
pub use ledger::RetirementLedger;
pub use manager::RetirementManager;
pub use record::RetirementRecord;
pub use retiree::{NotifyRetiree, RetireFuture, Retiree, retired};
pub use stats::{KeyBacklog, RetirementStats};
