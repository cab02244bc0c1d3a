use crate::domain::errors::MarketDataError;
use crate::domain::market::bar::Bar;
use crate::domain::ports::BarSource;
use crate::infrastructure::csv_bar_source::trim_to_lookback;
use chrono::Duration;
use std::collections::HashMap;

/// In-memory bar source for tests and demos.
#[derive(Debug, Default, Clone)]
pub struct MockBarSource {
    bars: HashMap<String, Vec<Bar>>,
    failing: HashMap<String, String>,
}

impl MockBarSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.bars.insert(symbol.to_string(), bars);
        self
    }

    /// Makes `fetch_bars` fail for `symbol`.
    pub fn with_failure(mut self, symbol: &str, reason: &str) -> Self {
        self.failing.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl BarSource for MockBarSource {
    fn fetch_bars(&self, symbol: &str, lookback: Duration) -> Result<Vec<Bar>, MarketDataError> {
        if let Some(reason) = self.failing.get(symbol) {
            return Err(MarketDataError::SourceUnavailable {
                symbol: symbol.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self
            .bars
            .get(symbol)
            .map(|bars| trim_to_lookback(bars.clone(), lookback))
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
