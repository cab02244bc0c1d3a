use serde::{Deserialize, Serialize};

/// Ordered list of model input columns.
/// This order is the contract between training and prediction: a snapshot
/// trained with one order cannot score rows built with another.
pub const FEATURE_NAMES: &[&str] = &["rsi", "ema_fast", "ema_slow", "macd", "macd_signal", "atr"];

/// Indicator state of one bar.
///
/// `timestamp` and `close` identify the source bar; they are not model inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub timestamp: i64,
    pub close: f64,
    pub rsi: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub atr: f64,
}

impl FeatureVector {
    /// Model inputs in `FEATURE_NAMES` order.
    pub fn to_f64_vector(&self) -> Vec<f64> {
        vec![
            self.rsi,
            self.ema_fast,
            self.ema_slow,
            self.macd,
            self.macd_signal,
            self.atr,
        ]
    }

    /// Name of the first model input that is NaN or infinite.
    pub fn non_finite_column(&self) -> Option<&'static str> {
        self.to_f64_vector()
            .iter()
            .zip(FEATURE_NAMES)
            .find(|(v, _)| !v.is_finite())
            .map(|(_, name)| *name)
    }

    pub fn is_finite(&self) -> bool {
        self.non_finite_column().is_none()
    }
}

pub fn feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

/// Tabular classifier input: named columns plus row-major values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        Self { columns, rows }
    }

    pub fn from_vectors(vectors: &[FeatureVector]) -> Self {
        Self {
            columns: feature_names(),
            rows: vectors.iter().map(FeatureVector::to_f64_vector).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
