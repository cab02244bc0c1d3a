use crate::application::feature_engineering_service::{FeatureExtractor, IndicatorConfig};
use crate::application::ml::boosting::GbmParams;
use crate::application::ml::direction_classifier::{DirectionClassifier, label_for_probability};
use crate::application::ml::labeler::label_features;
use crate::domain::errors::PredictorError;
use crate::domain::market::bar::{Bar, validate_series};
use crate::domain::ml::feature_registry::{FeatureMatrix, FeatureVector};
use crate::domain::ml::signal::{Direction, DirectionSignal};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Outcome of fitting the classifier on a bar history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Column order the classifier expects at prediction time
    pub feature_names: Vec<String>,
    pub bars: usize,
    pub feature_rows: usize,
    pub training_rows: usize,
    pub up_ratio: f64,
}

/// Feature extraction, labeling and classification for one instrument.
pub struct DirectionPipeline {
    extractor: FeatureExtractor,
    classifier: DirectionClassifier,
}

impl DirectionPipeline {
    pub fn new(indicators: &IndicatorConfig, params: GbmParams) -> Result<Self, PredictorError> {
        Self::with_classifier(
            indicators,
            DirectionClassifier::for_indicators(params, indicators)?,
        )
    }

    /// Wraps an existing (e.g. restored) classifier.
    ///
    /// A trained classifier only accepts the indicator periods it was fitted
    /// with; an untrained one is rebound to `indicators`.
    pub fn with_classifier(
        indicators: &IndicatorConfig,
        classifier: DirectionClassifier,
    ) -> Result<Self, PredictorError> {
        let classifier = if classifier.indicators() == indicators {
            classifier
        } else if classifier.is_trained() {
            return Err(PredictorError::IndicatorMismatch {
                trained: classifier.indicators().to_string(),
                requested: indicators.to_string(),
            });
        } else {
            DirectionClassifier::for_indicators(classifier.params().clone(), indicators)?
        };

        Ok(Self {
            extractor: FeatureExtractor::new(indicators)?,
            classifier,
        })
    }

    /// Pipeline computing features the way `classifier` was trained on.
    pub fn from_classifier(classifier: DirectionClassifier) -> Result<Self, PredictorError> {
        let indicators = classifier.indicators().clone();
        Self::with_classifier(&indicators, classifier)
    }

    pub fn classifier(&self) -> &DirectionClassifier {
        &self.classifier
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Bars needed for at least one labeled training row.
    pub fn min_training_bars(&self) -> usize {
        self.extractor.config().min_bars() + 1
    }

    /// Validated feature extraction; too little history gives an empty vector.
    pub fn features(&self, bars: &[Bar]) -> Result<Vec<FeatureVector>, PredictorError> {
        validate_series(bars)?;
        self.extractor.extract(bars)
    }

    /// Extracts, labels and trains on the full history in one shot.
    pub fn fit_history(&mut self, bars: &[Bar]) -> Result<TrainingReport, PredictorError> {
        let features = self.features(bars)?;
        let labeled = label_features(bars, &features)?;
        if labeled.is_empty() {
            return Err(PredictorError::InsufficientHistory {
                required: self.min_training_bars(),
                available: bars.len(),
            });
        }

        let matrix = FeatureMatrix::from_vectors(&labeled.features);
        let feature_names = self.classifier.train(&matrix, &labeled.labels)?;

        let report = TrainingReport {
            feature_names,
            bars: bars.len(),
            feature_rows: features.len(),
            training_rows: labeled.len(),
            up_ratio: labeled.up_ratio(),
        };
        info!(
            "DirectionPipeline: fitted on {} bars -> {} rows ({:.1}% up)",
            report.bars,
            report.training_rows,
            report.up_ratio * 100.0
        );
        Ok(report)
    }

    pub fn predict(&self, features: &[FeatureVector]) -> Result<Vec<u8>, PredictorError> {
        self.classifier
            .predict(&FeatureMatrix::from_vectors(features))
    }

    pub fn predict_proba(&self, features: &[FeatureVector]) -> Result<Vec<f64>, PredictorError> {
        self.classifier
            .predict_proba(&FeatureMatrix::from_vectors(features))
    }

    /// Direction call for every feature row.
    pub fn signals(
        &self,
        features: &[FeatureVector],
    ) -> Result<Vec<DirectionSignal>, PredictorError> {
        let probabilities = self.predict_proba(features)?;

        Ok(features
            .iter()
            .zip(probabilities)
            .map(|(fv, probability)| DirectionSignal {
                timestamp: fv.timestamp,
                close: fv.close,
                direction: Direction::from_label(label_for_probability(probability)),
                probability,
            })
            .collect())
    }

    /// Direction call for the most recent bar of `bars`.
    pub fn latest_signal(&self, bars: &[Bar]) -> Result<DirectionSignal, PredictorError> {
        let features = self.features(bars)?;
        let Some(latest) = features.last() else {
            return Err(PredictorError::InsufficientHistory {
                required: self.extractor.config().min_bars(),
                available: bars.len(),
            });
        };

        self.signals(std::slice::from_ref(latest))?
            .pop()
            .ok_or(PredictorError::InsufficientHistory {
                required: self.extractor.config().min_bars(),
                available: bars.len(),
            })
    }
}
