use serde::{Deserialize, Serialize};
use std::fmt;

/// Partition identifier under which entity work is serialized upstream.
///
/// Different keys may execute in parallel; within one key, completion
/// visibility is FIFO in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConcurrencyKey(pub i32);

impl ConcurrencyKey {
    /// Global ordering point spanning every other key.
    pub const UNIVERSAL: ConcurrencyKey = ConcurrencyKey(i32::MIN);

    /// Key reserved for management operations. Ordered like any other key.
    pub const MANAGEMENT: ConcurrencyKey = ConcurrencyKey(0);

    pub fn new(value: i32) -> Self {
        ConcurrencyKey(value)
    }

    pub fn is_universal(&self) -> bool {
        *self == Self::UNIVERSAL
    }

    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl From<i32> for ConcurrencyKey {
    fn from(value: i32) -> Self {
        ConcurrencyKey(value)
    }
}

impl fmt::Display for ConcurrencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_universal() {
            write!(f, "key_universal")
        } else {
            write!(f, "key_{}", self.0)
        }
    }
}

/// Global registration order of a record. Doubles as the record's arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationSeq(pub u64);

impl RegistrationSeq {
    pub fn next(&self) -> Self {
        RegistrationSeq(self.0 + 1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrationSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq_{}", self.0)
    }
}
