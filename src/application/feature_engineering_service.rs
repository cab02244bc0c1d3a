use crate::domain::errors::PredictorError;
use crate::domain::market::bar::Bar;
use crate::domain::ml::feature_registry::FeatureVector;
use serde::{Deserialize, Serialize};
use std::fmt;
use ta::Next;
use ta::indicators::{
    ExponentialMovingAverage, MovingAverageConvergenceDivergence, SimpleMovingAverage, TrueRange,
};
use tracing::{debug, warn};

/// Longest accepted indicator period; keeps warm-up arithmetic in range.
pub const MAX_PERIOD: usize = 100_000;

/// Indicator periods used to build feature vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,
    pub macd_fast_period: usize,
    pub macd_slow_period: usize,
    pub macd_signal_period: usize,
    pub atr_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            ema_fast_period: 20,
            ema_slow_period: 50,
            macd_fast_period: 12,
            macd_slow_period: 26,
            macd_signal_period: 9,
            atr_period: 14,
        }
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> Result<(), PredictorError> {
        let periods = [
            ("rsi_period", self.rsi_period),
            ("ema_fast_period", self.ema_fast_period),
            ("ema_slow_period", self.ema_slow_period),
            ("macd_fast_period", self.macd_fast_period),
            ("macd_slow_period", self.macd_slow_period),
            ("macd_signal_period", self.macd_signal_period),
            ("atr_period", self.atr_period),
        ];
        for (name, period) in periods {
            if period == 0 || period > MAX_PERIOD {
                return Err(PredictorError::InvalidParameters {
                    reason: format!("{} must be in 1..={}, got {}", name, MAX_PERIOD, period),
                });
            }
        }
        if self.macd_fast_period >= self.macd_slow_period {
            return Err(PredictorError::InvalidParameters {
                reason: format!(
                    "macd_fast_period ({}) must be below macd_slow_period ({})",
                    self.macd_fast_period, self.macd_slow_period
                ),
            });
        }
        Ok(())
    }

    /// Number of preceding bars needed before every indicator is defined.
    ///
    /// A period-`n` indicator is defined once `n` earlier bars exist; the MACD
    /// signal line additionally smooths the MACD line over its own period.
    pub fn warmup_bars(&self) -> usize {
        [
            self.rsi_period,
            self.ema_fast_period,
            self.ema_slow_period,
            self.macd_slow_period,
            self.macd_slow_period
                .saturating_add(self.macd_signal_period)
                .saturating_sub(1),
            self.atr_period,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    /// Shortest series that yields at least one feature vector.
    pub fn min_bars(&self) -> usize {
        self.warmup_bars().saturating_add(1)
    }
}

impl fmt::Display for IndicatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rsi {}, ema {}/{}, macd {}/{}/{}, atr {}",
            self.rsi_period,
            self.ema_fast_period,
            self.ema_slow_period,
            self.macd_fast_period,
            self.macd_slow_period,
            self.macd_signal_period,
            self.atr_period
        )
    }
}

/// Fresh indicator state; cloned for every extraction so calls never share state.
#[derive(Debug, Clone)]
struct IndicatorBank {
    // Wilder smoothing (alpha = 1/n) expressed as an EMA of period 2n - 1
    rsi_up: ExponentialMovingAverage,
    rsi_down: ExponentialMovingAverage,
    ema_fast: ExponentialMovingAverage,
    ema_slow: ExponentialMovingAverage,
    macd: MovingAverageConvergenceDivergence,
    true_range: TrueRange,
    atr: SimpleMovingAverage,
}

impl IndicatorBank {
    fn new(config: &IndicatorConfig) -> Result<Self, PredictorError> {
        let wilder_period = 2 * config.rsi_period - 1;
        Ok(Self {
            rsi_up: ExponentialMovingAverage::new(wilder_period).map_err(invalid)?,
            rsi_down: ExponentialMovingAverage::new(wilder_period).map_err(invalid)?,
            ema_fast: ExponentialMovingAverage::new(config.ema_fast_period).map_err(invalid)?,
            ema_slow: ExponentialMovingAverage::new(config.ema_slow_period).map_err(invalid)?,
            macd: MovingAverageConvergenceDivergence::new(
                config.macd_fast_period,
                config.macd_slow_period,
                config.macd_signal_period,
            )
            .map_err(invalid)?,
            true_range: TrueRange::new(),
            atr: SimpleMovingAverage::new(config.atr_period).map_err(invalid)?,
        })
    }
}

fn invalid(e: ta::errors::TaError) -> PredictorError {
    PredictorError::InvalidParameters {
        reason: format!("indicator construction failed: {:?}", e),
    }
}

/// Maps smoothed gains and losses onto the 0..100 RSI scale.
pub fn rsi_from_averages(avg_up: f64, avg_down: f64) -> f64 {
    if avg_down <= 0.0 {
        if avg_up <= 0.0 { 50.0 } else { 100.0 }
    } else {
        let rs = avg_up / avg_down;
        100.0 - 100.0 / (1.0 + rs)
    }
}

/// Turns a bar series into per-bar technical feature vectors.
///
/// Leading bars whose indicators lack history are dropped, so the output is
/// always a suffix of the input in the same order. A non-finite value past the
/// warm-up is an error rather than a gap.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: IndicatorConfig,
    prototype: IndicatorBank,
}

impl FeatureExtractor {
    pub fn new(config: &IndicatorConfig) -> Result<Self, PredictorError> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            prototype: IndicatorBank::new(config)?,
        })
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    pub fn extract(&self, bars: &[Bar]) -> Result<Vec<FeatureVector>, PredictorError> {
        let warmup = self.config.warmup_bars();
        if bars.len() <= warmup {
            debug!(
                "FeatureExtractor: {} bars below minimum {}, no features",
                bars.len(),
                self.config.min_bars()
            );
            return Ok(Vec::new());
        }

        let mut ind = self.prototype.clone();
        let mut features = Vec::with_capacity(bars.len() - warmup);
        let mut prev_close: Option<f64> = None;

        for (index, bar) in bars.iter().enumerate() {
            let close = bar.close_f64();

            let ema_fast = ind.ema_fast.next(close);
            let ema_slow = ind.ema_slow.next(close);
            let macd = ind.macd.next(close);
            let true_range = ind.true_range.next(bar);

            // The first bar has no previous close: no price change, no true range.
            let (rsi, atr) = match prev_close {
                Some(prev) => {
                    let change = close - prev;
                    let avg_up = ind.rsi_up.next(change.max(0.0));
                    let avg_down = ind.rsi_down.next((-change).max(0.0));
                    (
                        rsi_from_averages(avg_up, avg_down),
                        ind.atr.next(true_range),
                    )
                }
                None => (f64::NAN, f64::NAN),
            };
            prev_close = Some(close);

            if index < warmup {
                continue;
            }

            let fv = FeatureVector {
                timestamp: bar.timestamp,
                close,
                rsi,
                ema_fast,
                ema_slow,
                macd: macd.macd,
                macd_signal: macd.signal,
                atr,
            };
            features.push(checked_row(index, fv)?);
        }

        debug!(
            "FeatureExtractor: {} bars -> {} feature rows (warmup {})",
            bars.len(),
            features.len(),
            warmup
        );
        Ok(features)
    }
}

fn checked_row(index: usize, fv: FeatureVector) -> Result<FeatureVector, PredictorError> {
    match fv.non_finite_column() {
        None => Ok(fv),
        Some(column) => {
            warn!(
                "FeatureExtractor: non-finite {} at bar {} (ts {})",
                column, index, fv.timestamp
            );
            Err(PredictorError::NonFiniteFeature {
                row: index,
                column: column.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal::prelude::FromPrimitive;

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let close = Decimal::from_f64(c).unwrap();
                let high = Decimal::from_f64(c + 1.0).unwrap();
                let low = Decimal::from_f64(c - 1.0).unwrap();
                Bar::new(i as i64 * 60, close, high, low, close, Decimal::from(1000))
            })
            .collect()
    }

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(&IndicatorConfig::default()).unwrap()
    }

    #[test]
    fn test_default_warmup() {
        let config = IndicatorConfig::default();
        assert_eq!(config.warmup_bars(), 50);
        assert_eq!(config.min_bars(), 51);
    }

    #[test]
    fn test_short_series_yields_nothing() {
        let bars = bars_from_closes(&vec![100.0; 50]);
        assert!(extractor().extract(&bars).unwrap().is_empty());
        assert!(extractor().extract(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_output_is_suffix_of_input() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        let bars = bars_from_closes(&closes);
        let features = extractor().extract(&bars).unwrap();

        assert_eq!(features.len(), 30);
        let offset = bars.len() - features.len();
        for (i, fv) in features.iter().enumerate() {
            assert_eq!(fv.timestamp, bars[offset + i].timestamp);
            assert!(fv.is_finite());
        }
    }

    #[test]
    fn test_flat_series_indicator_values() {
        let bars = bars_from_closes(&vec![100.0; 60]);
        let features = extractor().extract(&bars).unwrap();

        let last = features.last().unwrap();
        assert!((last.ema_fast - 100.0).abs() < 1e-9);
        assert!((last.ema_slow - 100.0).abs() < 1e-9);
        assert!(last.macd.abs() < 1e-9);
        assert!(last.macd_signal.abs() < 1e-9);
        // high - low is always 2.0 and closes never move
        assert!((last.atr - 2.0).abs() < 1e-9);
        // No gains and no losses
        assert_eq!(last.rsi, 50.0);
    }

    #[test]
    fn test_rising_series_saturates_rsi() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let features = extractor().extract(&bars_from_closes(&closes)).unwrap();

        for fv in &features {
            assert_eq!(fv.rsi, 100.0);
            assert!(fv.ema_fast > fv.ema_slow);
            assert!(fv.macd > 0.0);
        }
    }

    #[test]
    fn test_rsi_bounds() {
        assert_eq!(rsi_from_averages(0.0, 0.0), 50.0);
        assert_eq!(rsi_from_averages(1.0, 0.0), 100.0);
        assert_eq!(rsi_from_averages(0.0, 1.0), 0.0);
        assert!((rsi_from_averages(1.0, 1.0) - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_extract_is_stateless() {
        let closes: Vec<f64> = (0..70).map(|i| 50.0 + (i % 7) as f64).collect();
        let bars = bars_from_closes(&closes);
        let extractor = extractor();
        assert_eq!(extractor.extract(&bars).unwrap(), extractor.extract(&bars).unwrap());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = IndicatorConfig {
            macd_fast_period: 26,
            macd_slow_period: 12,
            ..Default::default()
        };
        assert!(matches!(
            FeatureExtractor::new(&config),
            Err(PredictorError::InvalidParameters { .. })
        ));

        let zero = IndicatorConfig {
            rsi_period: 0,
            ..Default::default()
        };
        assert!(FeatureExtractor::new(&zero).is_err());
    }

    #[test]
    fn test_huge_periods_rejected_without_overflow() {
        for config in [
            IndicatorConfig {
                rsi_period: usize::MAX,
                ..Default::default()
            },
            IndicatorConfig {
                macd_slow_period: usize::MAX,
                macd_signal_period: usize::MAX,
                ..Default::default()
            },
            IndicatorConfig {
                atr_period: MAX_PERIOD + 1,
                ..Default::default()
            },
        ] {
            assert!(config.min_bars() > 0);
            assert!(matches!(
                FeatureExtractor::new(&config),
                Err(PredictorError::InvalidParameters { .. })
            ));
        }

        let longest = IndicatorConfig {
            ema_slow_period: MAX_PERIOD,
            ..Default::default()
        };
        assert!(FeatureExtractor::new(&longest).is_ok());
    }

    #[test]
    fn test_non_finite_row_is_an_error() {
        let fv = FeatureVector {
            timestamp: 3_000,
            close: 100.0,
            rsi: 55.0,
            ema_fast: 100.0,
            ema_slow: 99.0,
            macd: 0.2,
            macd_signal: 0.1,
            atr: f64::NAN,
        };
        match checked_row(50, fv) {
            Err(PredictorError::NonFiniteFeature { row, column }) => {
                assert_eq!(row, 50);
                assert_eq!(column, "atr");
            }
            other => panic!("expected NonFiniteFeature, got {:?}", other),
        }
    }

    #[test]
    fn test_display_lists_periods() {
        assert_eq!(
            IndicatorConfig::default().to_string(),
            "rsi 14, ema 20/50, macd 12/26/9, atr 14"
        );
    }
}
