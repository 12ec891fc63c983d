pub mod error;
pub mod types;

pub use error::{ContractViolation, Result, RetirementError};
pub use types::{ConcurrencyKey, RegistrationSeq};
