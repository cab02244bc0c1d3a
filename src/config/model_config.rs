//! Classifier configuration parsing from environment variables.

use super::parse_env;
use crate::application::ml::boosting::GbmParams;
use anyhow::Result;
use std::env;
use std::path::PathBuf;

pub const DEFAULT_MODEL_PATH: &str = "data/ml/direction_model.json";

/// Model environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEnvConfig {
    pub params: GbmParams,
    pub model_path: PathBuf,
}

impl Default for ModelEnvConfig {
    fn default() -> Self {
        Self {
            params: GbmParams::default(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
        }
    }
}

impl ModelEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = GbmParams::default();
        let params = GbmParams {
            n_estimators: parse_env("GBM_N_ESTIMATORS", defaults.n_estimators)?,
            max_depth: parse_env("GBM_MAX_DEPTH", defaults.max_depth)?,
            learning_rate: parse_env("GBM_LEARNING_RATE", defaults.learning_rate)?,
            subsample: parse_env("GBM_SUBSAMPLE", defaults.subsample)?,
            seed: parse_env("GBM_SEED", defaults.seed)?,
            ..defaults
        };

        Ok(Self {
            params,
            model_path: env::var("ML_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_MODEL_PATH)),
        })
    }
}
