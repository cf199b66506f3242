//! Engine configuration.
//!
//! Supports configuration via environment variables:
//!
//! ```bash
//! # How ownership transfers are made atomic
//! BOARDROOM_TRANSFER_MODE=auto           # auto | transactional | compensating
//!
//! # How many times an operation is re-run after a store conflict
//! BOARDROOM_CONFLICT_RETRIES=2
//! ```

use std::env;
use std::str::FromStr;
use thiserror::Error;

pub const TRANSFER_MODE_VAR: &str = "BOARDROOM_TRANSFER_MODE";
pub const CONFLICT_RETRIES_VAR: &str = "BOARDROOM_CONFLICT_RETRIES";

const DEFAULT_CONFLICT_RETRIES: u32 = 2;

/// Strategy for the two writes of an ownership transfer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransferMode {
    /// Transactional when the store has native transactions, compensating otherwise.
    #[default]
    Auto,
    Transactional,
    Compensating,
}

impl TransferMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferMode::Auto => "auto",
            TransferMode::Transactional => "transactional",
            TransferMode::Compensating => "compensating",
        }
    }

    /// Pick the concrete strategy for a store.
    pub fn resolve(self, native_transactions: bool) -> TransferMode {
        match self {
            TransferMode::Auto if native_transactions => TransferMode::Transactional,
            TransferMode::Auto => TransferMode::Compensating,
            TransferMode::Transactional if !native_transactions => {
                tracing::warn!("store has no native transactions; using compensating transfers");
                TransferMode::Compensating
            }
            mode => mode,
        }
    }
}

impl FromStr for TransferMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(TransferMode::Auto),
            "transactional" => Ok(TransferMode::Transactional),
            "compensating" => Ok(TransferMode::Compensating),
            _ => Err(ConfigError::InvalidTransferMode(s.to_string())),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid transfer mode: {0}. Expected 'auto', 'transactional' or 'compensating'")]
    InvalidTransferMode(String),

    #[error("Invalid conflict retry count: {0}")]
    InvalidRetries(String),
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub transfer_mode: TransferMode,
    /// Extra attempts after a retryable store conflict (0 disables retries).
    pub conflict_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transfer_mode: TransferMode::Auto,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let transfer_mode = match env::var(TRANSFER_MODE_VAR) {
            Ok(v) => v.parse()?,
            Err(_) => TransferMode::Auto,
        };

        let conflict_retries = match env::var(CONFLICT_RETRIES_VAR) {
            Ok(v) => v
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidRetries(v.clone()))?,
            Err(_) => DEFAULT_CONFLICT_RETRIES,
        };

        Ok(Self {
            transfer_mode,
            conflict_retries,
        })
    }

    pub fn with_transfer_mode(mut self, mode: TransferMode) -> Self {
        self.transfer_mode = mode;
        self
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }
}
