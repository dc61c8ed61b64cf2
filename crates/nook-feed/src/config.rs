use nook_ledger::LedgerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{FeedError, FeedResult};

/// Configuration for the feed assembler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Maximum number of posts requested per page.
    pub page_size: usize,
    /// Body length, in characters, after which a view shows a preview.
    pub preview_chars: usize,
    /// Settings for the optimistic mutation ledger.
    pub ledger: LedgerConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            preview_chars: 150,
            ledger: LedgerConfig::default(),
        }
    }
}

impl FeedConfig {
    /// Parse and validate a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> FeedResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| FeedError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> FeedResult<()> {
        if self.page_size == 0 {
            return Err(FeedError::Config("page_size must be at least 1".into()));
        }
        self.ledger.validate()?;
        Ok(())
    }
}
