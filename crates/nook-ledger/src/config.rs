use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Configuration for the mutation ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// A pending mutation older than this is treated as failed on the next
    /// reconciliation of its post.
    pub stale_after: Duration,
    /// Maximum distance between a draft comment's local timestamp and a
    /// confirmed comment's timestamp for the two to be considered the same.
    pub comment_match_window: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30),
            comment_match_window: Duration::from_secs(120),
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.stale_after.is_zero() {
            return Err(LedgerError::Config("stale_after must be positive".into()));
        }
        Ok(())
    }
}
