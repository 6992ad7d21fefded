//! Service configuration

use crate::error::{ForecastError, Result};
use crate::metrics::CrossValidationConfig;
use crate::models::{Hyperparameters, ModelSettings};
use crate::preparation::PreparationConfig;
use crate::tuning::TuningConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Everything the forecast service needs to train, store and evaluate models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Directory holding the model artifact and metrics sidecar
    pub model_dir: PathBuf,
    /// Logical model identity, used as the file stem
    pub model_name: String,
    /// Entity whose history is trained on; `None` uses every row
    pub entity_key: Option<String>,
    /// Data preparation settings
    pub preparation: PreparationConfig,
    /// Hyperparameters used when not tuning
    pub hyperparameters: Hyperparameters,
    /// Interval width and fallback thresholds
    pub model: ModelSettings,
    /// Windows of the post-training evaluation
    pub evaluation: CrossValidationConfig,
    /// Hyperparameter search settings
    pub tuning: TuningConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            model_name: "demand_model".to_string(),
            entity_key: None,
            preparation: PreparationConfig::default(),
            hyperparameters: Hyperparameters::default(),
            model: ModelSettings::default(),
            evaluation: CrossValidationConfig::default(),
            tuning: TuningConfig::default(),
        }
    }
}

impl ForecastConfig {
    /// Load a configuration from a JSON file; missing keys take defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(ForecastError::InvalidParameter(
                "Model name must not be empty".to_string(),
            ));
        }
        self.preparation.validate()?;
        self.hyperparameters.validate()?;
        self.model.validate()?;
        self.evaluation.validate()?;
        self.tuning.grid.validate()?;
        self.tuning.cross_validation.validate()
    }
}
