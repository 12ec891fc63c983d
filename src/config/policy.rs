use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How records registered on [`ConcurrencyKey::UNIVERSAL`] are ordered
/// against everything else.
///
/// [`ConcurrencyKey::UNIVERSAL`]: crate::core::ConcurrencyKey::UNIVERSAL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniversalKeyPolicy {
    /// Universal records queue behind nothing. Only holds and deferrals
    /// gate them, and they never gate other keys.
    Unordered,

    /// Universal records act as a global barrier: every earlier
    /// registration must retire first, and no later registration may retire
    /// before them. Records the barrier itself waits on are exempt.
    Barrier,
}

impl Default for UniversalKeyPolicy {
    fn default() -> Self {
        Self::Unordered
    }
}

impl fmt::Display for UniversalKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniversalKeyPolicy::Unordered => write!(f, "unordered"),
            UniversalKeyPolicy::Barrier => write!(f, "barrier"),
        }
    }
}

impl FromStr for UniversalKeyPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unordered" => Ok(Self::Unordered),
            "barrier" => Ok(Self::Barrier),
            other => Err(format!("Unknown universal key policy '{}'", other)),
        }
    }
}
