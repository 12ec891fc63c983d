use thiserror::Error;

/// Misuse of the retirement contract by the calling pipeline.
///
/// These are programming errors: continuing after one would corrupt the
/// ordering of every other message sharing the affected key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("Message {0} is already registered")]
    DuplicateRegistration(String),

    #[error("Message {0} is not registered")]
    UnknownMessage(String),

    #[error("Message {0} cannot defer its retirement to itself")]
    SelfDeferral(String),

    #[error("Deferring {source_message} to {target} would create a retirement cycle")]
    DeferralCycle {
        source_message: String,
        target: String,
    },

    #[error("Message {0} was released without a matching hold")]
    ReleaseWithoutHold(String),
}

#[derive(Error, Debug)]
pub enum RetirementError {
    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, RetirementError>;

impl<T> From<std::sync::PoisonError<T>> for RetirementError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
