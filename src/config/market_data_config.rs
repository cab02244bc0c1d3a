//! Market data configuration parsing from environment variables.

use super::parse_env;
use anyhow::Result;
use chrono::Duration;
use std::env;
use std::path::PathBuf;

/// Market data environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MarketDataEnvConfig {
    pub data_dir: PathBuf,
    pub lookback_minutes: i64,
}

impl Default for MarketDataEnvConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/bars"),
            lookback_minutes: 300,
        }
    }
}

impl MarketDataEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            data_dir: env::var("BAR_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            lookback_minutes: parse_env("BAR_LOOKBACK_MINUTES", defaults.lookback_minutes)?,
        })
    }

    pub fn lookback(&self) -> Duration {
        Duration::minutes(self.lookback_minutes)
    }
}
