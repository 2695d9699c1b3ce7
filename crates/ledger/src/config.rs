//! Ledger configuration.
//!
//! Environment variables:
//! - `STORE_LEDGER_OWNER` (required): UUID of the administrator identity.
//! - `STORE_LEDGER_REFUND_WINDOW` (optional): refund window in blocks, default 100.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use storeledger_core::CallerId;

/// Number of blocks after a purchase during which a refund is accepted.
pub const DEFAULT_REFUND_WINDOW: u64 = 100;

pub const OWNER_VAR: &str = "STORE_LEDGER_OWNER";
pub const REFUND_WINDOW_VAR: &str = "STORE_LEDGER_REFUND_WINDOW";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("STORE_LEDGER_OWNER is not set")]
    MissingOwner,

    #[error("invalid owner identity: {0}")]
    InvalidOwner(String),

    #[error("invalid refund window: {0}")]
    InvalidRefundWindow(String),
}

/// Construction-time settings. Fixed for the lifetime of a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub owner: CallerId,
    #[serde(default = "default_refund_window")]
    pub refund_window: u64,
}

fn default_refund_window() -> u64 {
    DEFAULT_REFUND_WINDOW
}

impl LedgerConfig {
    pub fn new(owner: CallerId) -> Self {
        Self {
            owner,
            refund_window: DEFAULT_REFUND_WINDOW,
        }
    }

    pub fn with_refund_window(mut self, blocks: u64) -> Self {
        self.refund_window = blocks;
        self
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (env, file, test map, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let owner = lookup(OWNER_VAR).ok_or(ConfigError::MissingOwner)?;
        let owner: CallerId = owner
            .trim()
            .parse()
            .map_err(|e: storeledger_core::DomainError| ConfigError::InvalidOwner(e.to_string()))?;

        let refund_window = match lookup(REFUND_WINDOW_VAR) {
            None => {
                tracing::debug!(
                    "{REFUND_WINDOW_VAR} not set; using default of {DEFAULT_REFUND_WINDOW} blocks"
                );
                DEFAULT_REFUND_WINDOW
            }
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidRefundWindow(format!("{raw:?}: {e}")))?,
        };

        let config = Self {
            owner,
            refund_window,
        };
        config.validate()?;
        Ok(config)
    }

    /// A zero-block window would make every refund fail; reject it up front.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refund_window == 0 {
            return Err(ConfigError::InvalidRefundWindow(
                "window must be at least one block".to_string(),
            ));
        }
        Ok(())
    }
}
