use rust_decimal::Decimal;
use thiserror::Error;

/// Errors related to upstream market data.
///
/// The predictor never repairs bad bars; these surface unchanged to the caller.
#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("Non-monotonic timestamp at bar {index}: {current} does not follow {previous}")]
    NonMonotonicTimestamp {
        index: usize,
        previous: i64,
        current: i64,
    },

    #[error("Non-positive {field} price at bar {index}: {value}")]
    NonPositivePrice {
        index: usize,
        field: &'static str,
        value: Decimal,
    },

    #[error("Invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: String },

    #[error("Malformed bar data for {symbol}: {reason}")]
    Malformed { symbol: String, reason: String },

    #[error("Market data source unavailable for {symbol}: {reason}")]
    SourceUnavailable { symbol: String, reason: String },
}

/// Errors raised by the direction predictor.
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("Insufficient history: need at least {required} bars, got {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("Model not trained")]
    UntrainedModel,

    #[error("Feature columns mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Model was trained on indicators ({trained}) but features use ({requested})")]
    IndicatorMismatch { trained: String, requested: String },

    #[error("Row {row} has {actual} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Length mismatch: {rows} feature rows vs {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },

    #[error("{rows} feature rows cannot come from {bars} bars")]
    FeaturesExceedBars { rows: usize, bars: usize },

    #[error("Feature row {row} (ts {timestamp}) is not aligned with bar ts {bar_timestamp}")]
    MisalignedFeatures {
        row: usize,
        timestamp: i64,
        bar_timestamp: i64,
    },

    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Invalid label {label} at row {row}: must be 0 or 1")]
    InvalidLabel { row: usize, label: u8 },

    #[error("Non-finite value in column {column} at row {row}")]
    NonFiniteFeature { row: usize, column: String },

    #[error("Invalid parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error("Model snapshot error: {reason}")]
    Snapshot { reason: String },

    #[error("Model I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Upstream(#[from] MarketDataError),
}

impl From<serde_json::Error> for PredictorError {
    fn from(e: serde_json::Error) -> Self {
        PredictorError::Snapshot {
            reason: e.to_string(),
        }
    }
}
