use super::boosting::{GbmParams, GradientBoostedTrees};
use crate::application::feature_engineering_service::IndicatorConfig;
use crate::domain::errors::PredictorError;
use crate::domain::ml::feature_registry::FeatureMatrix;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 2;

/// Probability above which a row is called "up".
pub const UP_THRESHOLD: f64 = 0.5;

/// 1 = up, 0 = not up.
pub fn label_for_probability(probability: f64) -> u8 {
    if probability > UP_THRESHOLD { 1 } else { 0 }
}

/// Serialized form of a trained classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub format_version: u32,
    pub feature_names: Vec<String>,
    /// Indicator periods the feature columns were computed with
    pub indicators: IndicatorConfig,
    pub params: GbmParams,
    pub ensemble: GradientBoostedTrees,
}

#[derive(Debug, Clone)]
struct TrainedModel {
    feature_names: Vec<String>,
    ensemble: GradientBoostedTrees,
}

/// Binary next-bar direction classifier owning one boosted ensemble.
///
/// Starts untrained. `train` replaces any previous fit; `predict` requires the
/// column list returned by `train`. The indicator periods travel with the model
/// so a restored classifier is only fed features computed the same way.
#[derive(Debug, Clone)]
pub struct DirectionClassifier {
    params: GbmParams,
    indicators: IndicatorConfig,
    model: Option<TrainedModel>,
}

impl DirectionClassifier {
    /// Classifier for features built with the default indicator periods.
    pub fn new(params: GbmParams) -> Result<Self, PredictorError> {
        Self::for_indicators(params, &IndicatorConfig::default())
    }

    pub fn for_indicators(
        params: GbmParams,
        indicators: &IndicatorConfig,
    ) -> Result<Self, PredictorError> {
        params.validate()?;
        indicators.validate()?;
        Ok(Self {
            params,
            indicators: indicators.clone(),
            model: None,
        })
    }

    pub fn params(&self) -> &GbmParams {
        &self.params
    }

    pub fn indicators(&self) -> &IndicatorConfig {
        &self.indicators
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn feature_names(&self) -> Option<&[String]> {
        self.model.as_ref().map(|m| m.feature_names.as_slice())
    }

    /// Fits the ensemble on the whole table and returns the column order that
    /// `predict` will require. On error the previous fit (if any) is kept.
    pub fn train(
        &mut self,
        matrix: &FeatureMatrix,
        labels: &[u8],
    ) -> Result<Vec<String>, PredictorError> {
        if matrix.is_empty() || labels.is_empty() {
            return Err(PredictorError::EmptyTrainingSet);
        }
        if matrix.len() != labels.len() {
            return Err(PredictorError::LengthMismatch {
                rows: matrix.len(),
                labels: labels.len(),
            });
        }
        if matrix.columns.is_empty() {
            return Err(PredictorError::InvalidParameters {
                reason: "feature table has no columns".to_string(),
            });
        }
        if let Some((row, &label)) = labels.iter().enumerate().find(|(_, l)| **l > 1) {
            return Err(PredictorError::InvalidLabel { row, label });
        }
        check_rows(matrix)?;

        let up = labels.iter().filter(|&&l| l == 1).count();
        info!(
            "DirectionClassifier: training on {} rows x {} features ({} up / {} not up), {} trees depth {} lr {}",
            matrix.len(),
            matrix.columns.len(),
            up,
            labels.len() - up,
            self.params.n_estimators,
            self.params.max_depth,
            self.params.learning_rate
        );

        let ensemble = GradientBoostedTrees::fit(&matrix.rows, labels, &self.params)?;
        let feature_names = matrix.columns.clone();
        self.model = Some(TrainedModel {
            feature_names: feature_names.clone(),
            ensemble,
        });

        info!("DirectionClassifier: training complete");
        Ok(feature_names)
    }

    /// Probability of "up" for every row.
    pub fn predict_proba(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, PredictorError> {
        let model = self.model.as_ref().ok_or(PredictorError::UntrainedModel)?;

        if matrix.columns != model.feature_names {
            return Err(PredictorError::ShapeMismatch {
                expected: model.feature_names.clone(),
                actual: matrix.columns.clone(),
            });
        }
        check_rows(matrix)?;

        debug!("DirectionClassifier: scoring {} rows", matrix.len());
        Ok(matrix
            .rows
            .iter()
            .map(|row| model.ensemble.predict_proba(row))
            .collect())
    }

    /// One label per row: 1 = up, 0 = not up.
    pub fn predict(&self, matrix: &FeatureMatrix) -> Result<Vec<u8>, PredictorError> {
        Ok(self
            .predict_proba(matrix)?
            .into_iter()
            .map(label_for_probability)
            .collect())
    }

    pub fn snapshot(&self) -> Result<ModelSnapshot, PredictorError> {
        let model = self.model.as_ref().ok_or(PredictorError::UntrainedModel)?;
        Ok(ModelSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            feature_names: model.feature_names.clone(),
            indicators: self.indicators.clone(),
            params: self.params.clone(),
            ensemble: model.ensemble.clone(),
        })
    }

    pub fn from_snapshot(snapshot: ModelSnapshot) -> Result<Self, PredictorError> {
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(PredictorError::Snapshot {
                reason: format!(
                    "unsupported format version {} (expected {})",
                    snapshot.format_version, SNAPSHOT_FORMAT_VERSION
                ),
            });
        }
        if snapshot.ensemble.n_features() != snapshot.feature_names.len() {
            return Err(PredictorError::Snapshot {
                reason: format!(
                    "ensemble expects {} features but snapshot lists {}",
                    snapshot.ensemble.n_features(),
                    snapshot.feature_names.len()
                ),
            });
        }
        snapshot.params.validate()?;
        snapshot.indicators.validate()?;
        snapshot.ensemble.check_structure()?;

        Ok(Self {
            params: snapshot.params,
            indicators: snapshot.indicators,
            model: Some(TrainedModel {
                feature_names: snapshot.feature_names,
                ensemble: snapshot.ensemble,
            }),
        })
    }

    pub fn export_snapshot(&self) -> Result<String, PredictorError> {
        Ok(serde_json::to_string(&self.snapshot()?)?)
    }

    pub fn import_snapshot(json: &str) -> Result<Self, PredictorError> {
        let snapshot: ModelSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), PredictorError> {
        let json = self.export_snapshot()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, json)?;
        info!("DirectionClassifier: model saved to {:?}", path);
        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<Self, PredictorError> {
        let json = fs::read_to_string(path)?;
        let classifier = Self::import_snapshot(&json)?;
        info!("DirectionClassifier: model loaded from {:?}", path);
        Ok(classifier)
    }
}

/// Every row must match the column count and hold only finite values.
fn check_rows(matrix: &FeatureMatrix) -> Result<(), PredictorError> {
    let width = matrix.columns.len();
    for (row, values) in matrix.rows.iter().enumerate() {
        if values.len() != width {
            return Err(PredictorError::RowWidth {
                row,
                expected: width,
                actual: values.len(),
            });
        }
        if let Some(col) = values.iter().position(|v| !v.is_finite()) {
            return Err(PredictorError::NonFiniteFeature {
                row,
                column: matrix.columns[col].clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    fn table(n: usize) -> (FeatureMatrix, Vec<u8>) {
        let mut rows = Vec::with_capacity(n);
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let a = i as f64 - n as f64 / 2.0;
            rows.push(vec![a, (i % 3) as f64]);
            labels.push(if a > 0.0 { 1 } else { 0 });
        }
        (FeatureMatrix::new(columns(), rows), labels)
    }

    fn fast_params() -> GbmParams {
        GbmParams {
            n_estimators: 30,
            max_depth: 3,
            learning_rate: 0.1,
            ..Default::default()
        }
    }

    #[test]
    fn test_predict_before_train_fails() {
        let classifier = DirectionClassifier::new(GbmParams::default()).unwrap();
        let (matrix, _) = table(4);
        assert!(matches!(
            classifier.predict(&matrix),
            Err(PredictorError::UntrainedModel)
        ));
        assert!(matches!(
            classifier.export_snapshot(),
            Err(PredictorError::UntrainedModel)
        ));
    }

    #[test]
    fn test_train_returns_columns() {
        let mut classifier = DirectionClassifier::new(fast_params()).unwrap();
        let (matrix, labels) = table(40);
        let names = classifier.train(&matrix, &labels).unwrap();
        assert_eq!(names, columns());
        assert!(classifier.is_trained());
        assert_eq!(classifier.feature_names(), Some(columns().as_slice()));
    }

    #[test]
    fn test_predict_row_count_and_values() {
        let mut classifier = DirectionClassifier::new(fast_params()).unwrap();
        let (matrix, labels) = table(40);
        classifier.train(&matrix, &labels).unwrap();

        let (other, _) = table(7);
        let predictions = classifier.predict(&other).unwrap();
        assert_eq!(predictions.len(), 7);
        assert!(predictions.iter().all(|&p| p == 0 || p == 1));
    }

    #[test]
    fn test_reordered_columns_rejected() {
        let mut classifier = DirectionClassifier::new(fast_params()).unwrap();
        let (matrix, labels) = table(20);
        classifier.train(&matrix, &labels).unwrap();

        let swapped = FeatureMatrix::new(
            vec!["b".to_string(), "a".to_string()],
            matrix.rows.clone(),
        );
        assert!(matches!(
            classifier.predict(&swapped),
            Err(PredictorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_train_preconditions() {
        let mut classifier = DirectionClassifier::new(fast_params()).unwrap();

        let empty = FeatureMatrix::new(columns(), Vec::new());
        assert!(matches!(
            classifier.train(&empty, &[]),
            Err(PredictorError::EmptyTrainingSet)
        ));

        let (matrix, _) = table(5);
        assert!(matches!(
            classifier.train(&matrix, &[1, 0]),
            Err(PredictorError::LengthMismatch { rows: 5, labels: 2 })
        ));
        assert!(matches!(
            classifier.train(&matrix, &[1, 0, 2, 0, 1]),
            Err(PredictorError::InvalidLabel { row: 2, label: 2 })
        ));

        let ragged = FeatureMatrix::new(columns(), vec![vec![1.0, 2.0], vec![1.0]]);
        assert!(matches!(
            classifier.train(&ragged, &[1, 0]),
            Err(PredictorError::RowWidth { row: 1, .. })
        ));

        let nan = FeatureMatrix::new(columns(), vec![vec![1.0, f64::NAN]]);
        assert!(matches!(
            classifier.train(&nan, &[1]),
            Err(PredictorError::NonFiniteFeature { row: 0, .. })
        ));

        assert!(!classifier.is_trained());
    }

    #[test]
    fn test_retrain_replaces_fit() {
        let mut classifier = DirectionClassifier::new(fast_params()).unwrap();
        let (matrix, labels) = table(40);
        classifier.train(&matrix, &labels).unwrap();

        let inverted: Vec<u8> = labels.iter().map(|l| 1 - l).collect();
        classifier.train(&matrix, &inverted).unwrap();

        let points = FeatureMatrix::new(columns(), vec![vec![15.0, 0.0], vec![-15.0, 0.0]]);
        assert_eq!(classifier.predict(&points).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut classifier = DirectionClassifier::new(fast_params()).unwrap();
        let (matrix, labels) = table(40);
        classifier.train(&matrix, &labels).unwrap();

        let json = classifier.export_snapshot().unwrap();
        let restored = DirectionClassifier::import_snapshot(&json).unwrap();

        assert_eq!(restored.params(), classifier.params());
        assert_eq!(
            restored.predict(&matrix).unwrap(),
            classifier.predict(&matrix).unwrap()
        );
    }

    #[test]
    fn test_snapshot_version_checked() {
        let mut classifier = DirectionClassifier::new(fast_params()).unwrap();
        let (matrix, labels) = table(10);
        classifier.train(&matrix, &labels).unwrap();

        let mut snapshot = classifier.snapshot().unwrap();
        snapshot.format_version = 99;
        assert!(matches!(
            DirectionClassifier::from_snapshot(snapshot),
            Err(PredictorError::Snapshot { .. })
        ));

        let mut snapshot = classifier.snapshot().unwrap();
        snapshot.feature_names.pop();
        assert!(DirectionClassifier::from_snapshot(snapshot).is_err());

        assert!(DirectionClassifier::import_snapshot("not json").is_err());
    }

    fn trained_snapshot_json() -> serde_json::Value {
        let mut classifier = DirectionClassifier::new(fast_params()).unwrap();
        let (matrix, labels) = table(40);
        classifier.train(&matrix, &labels).unwrap();
        serde_json::from_str(&classifier.export_snapshot().unwrap()).unwrap()
    }

    #[test]
    fn test_cyclic_tree_rejected_on_import() {
        let mut json = trained_snapshot_json();
        json["ensemble"]["trees"][0]["nodes"] = serde_json::json!([
            {"Split": {"feature": 0, "threshold": 1e9, "left": 0, "right": 0}}
        ]);

        assert!(matches!(
            DirectionClassifier::import_snapshot(&json.to_string()),
            Err(PredictorError::Snapshot { .. })
        ));
    }

    #[test]
    fn test_unknown_feature_index_rejected_on_import() {
        let mut json = trained_snapshot_json();
        json["ensemble"]["trees"][0]["nodes"] = serde_json::json!([
            {"Split": {"feature": 5, "threshold": 0.0, "left": 1, "right": 2}},
            {"Leaf": {"value": 0.1}},
            {"Leaf": {"value": -0.1}}
        ]);

        assert!(matches!(
            DirectionClassifier::import_snapshot(&json.to_string()),
            Err(PredictorError::Snapshot { .. })
        ));
    }

    #[test]
    fn test_snapshot_carries_indicator_periods() {
        let indicators = IndicatorConfig {
            rsi_period: 5,
            ..Default::default()
        };
        let mut classifier =
            DirectionClassifier::for_indicators(fast_params(), &indicators).unwrap();
        let (matrix, labels) = table(40);
        classifier.train(&matrix, &labels).unwrap();

        let snapshot = classifier.snapshot().unwrap();
        assert_eq!(snapshot.format_version, SNAPSHOT_FORMAT_VERSION);
        assert_eq!(snapshot.indicators, indicators);

        let restored = DirectionClassifier::from_snapshot(snapshot).unwrap();
        assert_eq!(restored.indicators(), &indicators);

        let mut json = trained_snapshot_json();
        json["format_version"] = serde_json::json!(1);
        assert!(DirectionClassifier::import_snapshot(&json.to_string()).is_err());
    }

    #[test]
    fn test_label_for_probability_threshold() {
        assert_eq!(label_for_probability(0.5), 0);
        assert_eq!(label_for_probability(0.500001), 1);
        assert_eq!(label_for_probability(0.1), 0);
    }
}
