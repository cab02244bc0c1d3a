use crate::domain::errors::MarketDataError;
use crate::domain::market::bar::Bar;
use crate::domain::ports::BarSource;
use chrono::Duration;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct CsvBarRecord {
    timestamp: i64,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

/// Reads bars from `<data_dir>/<SYMBOL>.csv`.
///
/// Expected header: `timestamp,open,high,low,close,volume` with Unix-second
/// timestamps. Crypto pairs map `/` to `_` in the file name (`BTC/USD` ->
/// `BTC_USD.csv`).
pub struct CsvBarSource {
    data_dir: PathBuf,
}

impl CsvBarSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}.csv", symbol.trim().replace('/', "_")))
    }

    /// Parses a whole CSV document; used for files and in tests.
    pub fn parse<R: Read>(symbol: &str, reader: R) -> Result<Vec<Bar>, MarketDataError> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut bars = Vec::new();

        for (line, result) in rdr.deserialize::<CsvBarRecord>().enumerate() {
            let record = result.map_err(|e| MarketDataError::Malformed {
                symbol: symbol.to_string(),
                reason: format!("row {}: {}", line + 1, e),
            })?;

            let decimal = |field: &str, raw: &str| {
                Decimal::from_str(raw.trim()).map_err(|e| MarketDataError::Malformed {
                    symbol: symbol.to_string(),
                    reason: format!("row {}: bad {} '{}': {}", line + 1, field, raw, e),
                })
            };

            bars.push(Bar::new(
                record.timestamp,
                decimal("open", &record.open)?,
                decimal("high", &record.high)?,
                decimal("low", &record.low)?,
                decimal("close", &record.close)?,
                decimal("volume", &record.volume)?,
            ));
        }

        Ok(bars)
    }

    fn read_file(symbol: &str, path: &Path) -> Result<Vec<Bar>, MarketDataError> {
        let file = File::open(path).map_err(|e| MarketDataError::SourceUnavailable {
            symbol: symbol.to_string(),
            reason: format!("{:?}: {}", path, e),
        })?;
        Self::parse(symbol, BufReader::new(file))
    }
}

/// Keeps the bars within `lookback` of the newest bar.
pub fn trim_to_lookback(bars: Vec<Bar>, lookback: Duration) -> Vec<Bar> {
    let Some(newest) = bars.last().map(|b| b.timestamp) else {
        return bars;
    };
    let cutoff = newest.saturating_sub(lookback.num_seconds());
    bars.into_iter().filter(|b| b.timestamp >= cutoff).collect()
}

impl BarSource for CsvBarSource {
    fn fetch_bars(&self, symbol: &str, lookback: Duration) -> Result<Vec<Bar>, MarketDataError> {
        let path = self.path_for(symbol);
        if !path.exists() {
            warn!("No bar data for {} at {:?}", symbol, path);
            return Ok(Vec::new());
        }

        let bars = trim_to_lookback(Self::read_file(symbol, &path)?, lookback);
        info!(
            "Loaded {} bars for {} from {:?} (lookback {}m)",
            bars.len(),
            symbol,
            path,
            lookback.num_minutes()
        );
        Ok(bars)
    }

    fn name(&self) -> &str {
        "csv"
    }
}
