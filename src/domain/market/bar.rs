use crate::domain::errors::MarketDataError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// One OHLCV observation for a fixed interval.
///
/// Bars are produced by a [`BarSource`](crate::domain::ports::BarSource) and are
/// never mutated afterwards. `timestamp` is Unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Bar {
    pub fn new(
        timestamp: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn close_f64(&self) -> f64 {
        self.close.to_f64().unwrap_or(f64::NAN)
    }
}

// Lets `ta` indicators that need OHLC (TrueRange) consume bars directly.
impl ta::Open for Bar {
    fn open(&self) -> f64 {
        self.open.to_f64().unwrap_or(f64::NAN)
    }
}

impl ta::High for Bar {
    fn high(&self) -> f64 {
        self.high.to_f64().unwrap_or(f64::NAN)
    }
}

impl ta::Low for Bar {
    fn low(&self) -> f64 {
        self.low.to_f64().unwrap_or(f64::NAN)
    }
}

impl ta::Close for Bar {
    fn close(&self) -> f64 {
        self.close_f64()
    }
}

impl ta::Volume for Bar {
    fn volume(&self) -> f64 {
        self.volume.to_f64().unwrap_or(f64::NAN)
    }
}

/// Checks the invariants every bar series must satisfy before features are derived.
///
/// Timestamps strictly ascending, all prices positive, `low <= open/close <= high`
/// and a non-negative volume. Nothing is repaired: the first violation is returned.
pub fn validate_series(bars: &[Bar]) -> Result<(), MarketDataError> {
    let mut previous: Option<i64> = None;

    for (index, bar) in bars.iter().enumerate() {
        if let Some(prev) = previous {
            if bar.timestamp <= prev {
                return Err(MarketDataError::NonMonotonicTimestamp {
                    index,
                    previous: prev,
                    current: bar.timestamp,
                });
            }
        }
        previous = Some(bar.timestamp);

        for (field, value) in [
            ("open", bar.open),
            ("high", bar.high),
            ("low", bar.low),
            ("close", bar.close),
        ] {
            if value <= Decimal::ZERO {
                return Err(MarketDataError::NonPositivePrice {
                    index,
                    field,
                    value,
                });
            }
        }

        if bar.low > bar.high {
            return Err(MarketDataError::InvalidBar {
                index,
                reason: format!("low {} above high {}", bar.low, bar.high),
            });
        }

        if bar.close > bar.high || bar.close < bar.low || bar.open > bar.high || bar.open < bar.low
        {
            return Err(MarketDataError::InvalidBar {
                index,
                reason: format!(
                    "open {} / close {} outside range [{}, {}]",
                    bar.open, bar.close, bar.low, bar.high
                ),
            });
        }

        if bar.volume < Decimal::ZERO {
            return Err(MarketDataError::InvalidBar {
                index,
                reason: format!("negative volume {}", bar.volume),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(ts: i64, close: Decimal) -> Bar {
        Bar::new(ts, close, close + dec!(1), close - dec!(1), close, dec!(1000))
    }

    #[test]
    fn test_valid_series_passes() {
        let bars = vec![bar(60, dec!(100)), bar(120, dec!(101)), bar(180, dec!(99))];
        assert!(validate_series(&bars).is_ok());
    }

    #[test]
    fn test_empty_series_passes() {
        assert!(validate_series(&[]).is_ok());
    }

    #[test]
    fn test_duplicate_timestamp_rejected() {
        let bars = vec![bar(60, dec!(100)), bar(60, dec!(101))];
        match validate_series(&bars) {
            Err(MarketDataError::NonMonotonicTimestamp {
                index, previous, ..
            }) => {
                assert_eq!(index, 1);
                assert_eq!(previous, 60);
            }
            other => panic!("expected NonMonotonicTimestamp, got {:?}", other),
        }
    }

    #[test]
    fn test_non_positive_close_rejected() {
        let mut bad = bar(120, dec!(100));
        bad.close = dec!(0);
        bad.low = dec!(0);
        let bars = vec![bar(60, dec!(100)), bad];
        assert!(matches!(
            validate_series(&bars),
            Err(MarketDataError::NonPositivePrice { index: 1, .. })
        ));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut bad = bar(60, dec!(100));
        bad.high = dec!(98);
        assert!(matches!(
            validate_series(&[bad]),
            Err(MarketDataError::InvalidBar { index: 0, .. })
        ));
    }

    #[test]
    fn test_ta_traits_expose_f64() {
        use ta::{Close, High, Low};
        let b = bar(60, dec!(100.5));
        assert_eq!(b.close(), 100.5);
        assert_eq!(b.high(), 101.5);
        assert_eq!(b.low(), 99.5);
    }
}
