use crate::domain::errors::PredictorError;
use crate::domain::market::bar::Bar;
use crate::domain::ml::feature_registry::FeatureVector;
use tracing::debug;

/// Feature rows paired with their realized next-bar direction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LabeledSet {
    pub features: Vec<FeatureVector>,
    pub labels: Vec<u8>,
}

impl LabeledSet {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Share of rows labeled "up".
    pub fn up_ratio(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        self.labels.iter().filter(|&&l| l == 1).count() as f64 / self.labels.len() as f64
    }
}

/// 1 when the next close is strictly above the current close, else 0.
/// Flat moves count as "not up".
pub fn direction_label<T: PartialOrd>(current_close: T, next_close: T) -> u8 {
    if next_close > current_close { 1 } else { 0 }
}

/// Attaches next-bar direction labels to extractor output.
///
/// `features` must be a suffix of `bars` (as produced by the feature extractor).
/// The row of the last bar has no successor and is dropped.
pub fn label_features(
    bars: &[Bar],
    features: &[FeatureVector],
) -> Result<LabeledSet, PredictorError> {
    if features.len() > bars.len() {
        return Err(PredictorError::FeaturesExceedBars {
            rows: features.len(),
            bars: bars.len(),
        });
    }

    let offset = bars.len() - features.len();
    let mut set = LabeledSet {
        features: Vec::with_capacity(features.len()),
        labels: Vec::with_capacity(features.len()),
    };

    for (row, fv) in features.iter().enumerate() {
        let index = offset + row;
        let bar = &bars[index];
        if bar.timestamp != fv.timestamp {
            return Err(PredictorError::MisalignedFeatures {
                row,
                timestamp: fv.timestamp,
                bar_timestamp: bar.timestamp,
            });
        }

        let Some(next) = bars.get(index + 1) else {
            continue;
        };

        set.labels.push(direction_label(bar.close, next.close));
        set.features.push(fv.clone());
    }

    debug!(
        "Labeler: {} feature rows -> {} labeled rows ({:.1}% up)",
        features.len(),
        set.len(),
        set.up_ratio() * 100.0
    );
    Ok(set)
}
