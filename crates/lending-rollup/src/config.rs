//! pool configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Account, TokenId};

/// basis points in one whole
pub const BPS_DENOMINATOR: u64 = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// per-deployment pool settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// pool contract account (hex)
    pub account: Account,
    /// token lent and borrowed (hex)
    pub token_id: TokenId,
    /// collateral required per unit borrowed, in basis points.
    /// 10_000 allows borrowing up to the full contribution.
    #[serde(default = "default_collateral_ratio")]
    pub collateral_ratio_bps: u64,
    /// cap on dirty leaves across both maps before a rollup is required
    #[serde(default)]
    pub max_pending: Option<usize>,
}

fn default_collateral_ratio() -> u64 {
    BPS_DENOMINATOR
}

impl PoolConfig {
    pub fn new(account: Account, token_id: TokenId) -> Self {
        Self {
            account,
            token_id,
            collateral_ratio_bps: default_collateral_ratio(),
            max_pending: None,
        }
    }

    pub fn with_collateral_ratio(mut self, bps: u64) -> Self {
        self.collateral_ratio_bps = bps;
        self
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = Some(max_pending);
        self
    }

    /// load and validate a json config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collateral_ratio_bps == 0 {
            return Err(ConfigError::Invalid(
                "collateral_ratio_bps must be positive".into(),
            ));
        }
        if self.max_pending == Some(0) {
            return Err(ConfigError::Invalid("max_pending must be positive".into()));
        }
        Ok(())
    }

    /// collateral that must back `debt`, rounded up
    pub fn required_collateral(&self, debt: u64) -> u64 {
        let scaled = debt as u128 * self.collateral_ratio_bps as u128;
        let required = scaled.div_ceil(BPS_DENOMINATOR as u128);
        u64::try_from(required).unwrap_or(u64::MAX)
    }
}
