use crate::domain::errors::MarketDataError;
use crate::domain::market::bar::Bar;
use chrono::Duration;

/// Historical bar provider for a single instrument.
///
/// Implementations return bars in ascending timestamp order covering `lookback`
/// up to the most recent bar, or an empty vector when the symbol has no data.
pub trait BarSource {
    fn fetch_bars(&self, symbol: &str, lookback: Duration) -> Result<Vec<Bar>, MarketDataError>;

    /// Source name for logs.
    fn name(&self) -> &str;
}
