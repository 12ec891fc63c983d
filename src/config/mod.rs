// ============================================================================
// Retirement Configuration
// ============================================================================

pub mod policy;

pub use policy::UniversalKeyPolicy;

use crate::core::{Result, RetirementError};
use serde::{Deserialize, Serialize};

/// Upper bound accepted for `backlog_warn_depth`.
pub const MAX_BACKLOG_WARN_DEPTH: usize = 1 << 20;

/// Retirement manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetirementConfig {
    /// Ordering of universal-key records relative to other keys
    pub universal_key_policy: UniversalKeyPolicy,

    /// Warn when a single key queue grows past this depth (0 disables)
    pub backlog_warn_depth: usize,
}

impl RetirementConfig {
    pub fn new() -> Self {
        Self {
            universal_key_policy: UniversalKeyPolicy::default(),
            backlog_warn_depth: 1024,
        }
    }

    /// Set the universal key policy
    pub fn universal_key_policy(mut self, policy: UniversalKeyPolicy) -> Self {
        self.universal_key_policy = policy;
        self
    }

    /// Set the backlog warning depth
    pub fn backlog_warn_depth(mut self, depth: usize) -> Self {
        self.backlog_warn_depth = depth;
        self
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RetirementError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backlog_warn_depth > MAX_BACKLOG_WARN_DEPTH {
            return Err(RetirementError::InvalidConfig(format!(
                "backlog_warn_depth must be <= {}",
                MAX_BACKLOG_WARN_DEPTH
            )));
        }
        Ok(())
    }
}

impl Default for RetirementConfig {
    fn default() -> Self {
        Self::new()
    }
}
