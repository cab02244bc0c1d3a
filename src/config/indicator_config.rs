//! Indicator configuration parsing from environment variables.

use super::parse_env;
use crate::application::feature_engineering_service::IndicatorConfig;
use anyhow::Result;

/// Indicator environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorEnvConfig {
    pub rsi_period: usize,
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,
    pub macd_fast_period: usize,
    pub macd_slow_period: usize,
    pub macd_signal_period: usize,
    pub atr_period: usize,
}

impl Default for IndicatorEnvConfig {
    fn default() -> Self {
        let defaults = IndicatorConfig::default();
        Self {
            rsi_period: defaults.rsi_period,
            ema_fast_period: defaults.ema_fast_period,
            ema_slow_period: defaults.ema_slow_period,
            macd_fast_period: defaults.macd_fast_period,
            macd_slow_period: defaults.macd_slow_period,
            macd_signal_period: defaults.macd_signal_period,
            atr_period: defaults.atr_period,
        }
    }
}

impl IndicatorEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            rsi_period: parse_env("RSI_PERIOD", defaults.rsi_period)?,
            ema_fast_period: parse_env("EMA_FAST_PERIOD", defaults.ema_fast_period)?,
            ema_slow_period: parse_env("EMA_SLOW_PERIOD", defaults.ema_slow_period)?,
            macd_fast_period: parse_env("MACD_FAST_PERIOD", defaults.macd_fast_period)?,
            macd_slow_period: parse_env("MACD_SLOW_PERIOD", defaults.macd_slow_period)?,
            macd_signal_period: parse_env("MACD_SIGNAL_PERIOD", defaults.macd_signal_period)?,
            atr_period: parse_env("ATR_PERIOD", defaults.atr_period)?,
        })
    }

    pub fn to_indicator_config(&self) -> IndicatorConfig {
        IndicatorConfig {
            rsi_period: self.rsi_period,
            ema_fast_period: self.ema_fast_period,
            ema_slow_period: self.ema_slow_period,
            macd_fast_period: self.macd_fast_period,
            macd_slow_period: self.macd_slow_period,
            macd_signal_period: self.macd_signal_period,
            atr_period: self.atr_period,
        }
    }
}
