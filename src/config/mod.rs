//! Configuration module for nextbar.
//!
//! Structured configuration loaded from environment variables, organized by
//! concern: indicators, classifier and market data.

mod indicator_config;
mod market_data_config;
mod model_config;


pub use indicator_config::IndicatorEnvConfig;
pub use market_data_config::MarketDataEnvConfig;
pub use model_config::{DEFAULT_MODEL_PATH, ModelEnvConfig};

use crate::application::feature_engineering_service::IndicatorConfig;
use crate::application::ml::boosting::GbmParams;
use anyhow::{Context, Result};
use std::env;
use std::fmt::Display;
use std::str::FromStr;

/// Reads `key`, falling back to `default` when unset.
pub(crate) fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse {}='{}': {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub indicators: IndicatorEnvConfig,
    pub model: ModelEnvConfig,
    pub market_data: MarketDataEnvConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            indicators: IndicatorEnvConfig::from_env()
                .context("Failed to load indicator config")?,
            model: ModelEnvConfig::from_env().context("Failed to load model config")?,
            market_data: MarketDataEnvConfig::from_env()
                .context("Failed to load market data config")?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.indicator_config()
            .validate()
            .context("Invalid indicator configuration")?;
        self.model
            .params
            .validate()
            .context("Invalid model configuration")?;
        if self.market_data.lookback_minutes <= 0 {
            anyhow::bail!(
                "BAR_LOOKBACK_MINUTES must be > 0, got {}",
                self.market_data.lookback_minutes
            );
        }
        Ok(())
    }

    pub fn indicator_config(&self) -> IndicatorConfig {
        self.indicators.to_indicator_config()
    }

    pub fn gbm_params(&self) -> GbmParams {
        self.model.params.clone()
    }
}
