//! Grid search over decomposition hyperparameters

use crate::data::{HolidayEntry, PreparedSeries};
use crate::error::{ForecastError, Result};
use crate::metrics::{cross_validate, CrossValidationConfig};
use crate::models::strategy::{fit_decomposition, FitContext};
use crate::models::{FittedModel, Hyperparameters, ModelSettings, SeasonalityMode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Candidate values for each searched hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningGrid {
    pub changepoint_prior_scales: Vec<f64>,
    pub seasonality_prior_scales: Vec<f64>,
    pub holidays_prior_scales: Vec<f64>,
    pub seasonality_modes: Vec<SeasonalityMode>,
}

impl Default for TuningGrid {
    fn default() -> Self {
        Self {
            changepoint_prior_scales: vec![0.001, 0.01, 0.1, 0.5],
            seasonality_prior_scales: vec![0.01, 0.1, 1.0, 10.0],
            holidays_prior_scales: vec![0.01, 0.1, 1.0, 10.0],
            seasonality_modes: vec![SeasonalityMode::Additive, SeasonalityMode::Multiplicative],
        }
    }
}

impl TuningGrid {
    /// Number of combinations in the grid
    pub fn len(&self) -> usize {
        self.changepoint_prior_scales.len()
            * self.seasonality_prior_scales.len()
            * self.holidays_prior_scales.len()
            * self.seasonality_modes.len()
    }

    /// Check if the grid has no combinations
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every combination applied to `base`, mode varying fastest
    pub fn combinations(&self, base: &Hyperparameters) -> Vec<Hyperparameters> {
        let mut combinations = Vec::with_capacity(self.len());
        for &cps in &self.changepoint_prior_scales {
            for &sps in &self.seasonality_prior_scales {
                for &hps in &self.holidays_prior_scales {
                    for &mode in &self.seasonality_modes {
                        combinations.push(base.with_search_point(cps, sps, hps, mode));
                    }
                }
            }
        }
        combinations
    }

    /// Reject an empty grid or non-positive scales
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "Tuning grid has no combinations".to_string(),
            ));
        }
        let scales = self
            .changepoint_prior_scales
            .iter()
            .chain(&self.seasonality_prior_scales)
            .chain(&self.holidays_prior_scales);
        for &scale in scales {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(ForecastError::InvalidParameter(format!(
                    "Tuning grid scales must be positive, got {}",
                    scale
                )));
            }
        }
        Ok(())
    }
}

/// Tuner settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Searched values
    pub grid: TuningGrid,
    /// Cross-validation windows used to score each combination
    pub cross_validation: CrossValidationConfig,
    /// Stop starting new combinations after this many seconds
    pub time_limit_secs: Option<u64>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            grid: TuningGrid::default(),
            cross_validation: CrossValidationConfig::tuning(),
            time_limit_secs: None,
        }
    }
}

/// Best combination found by a search
#[derive(Debug, Clone, PartialEq)]
pub struct TuningResult {
    pub params: Hyperparameters,
    /// Mean cross-validated RMSE
    pub score: f64,
    /// Combinations that produced a score
    pub evaluated: usize,
    /// Combinations skipped because fitting or scoring failed
    pub skipped: usize,
}

/// Exhaustive grid search scored by cross-validated RMSE
#[derive(Debug, Clone)]
pub struct HyperparameterTuner {
    config: TuningConfig,
}

impl HyperparameterTuner {
    /// Create a tuner
    pub fn new(config: TuningConfig) -> Result<Self> {
        config.grid.validate()?;
        config.cross_validation.validate()?;
        Ok(Self { config })
    }

    /// Tuner settings
    pub fn config(&self) -> &TuningConfig {
        &self.config
    }

    /// Search the grid and return the lowest-RMSE combination
    ///
    /// Every candidate is fitted as a seasonal decomposition without the
    /// fallback ladder, so a combination that fails to converge is skipped
    /// rather than scored as a moving average.
    pub fn optimize(
        &self,
        series: &PreparedSeries,
        holidays: &[HolidayEntry],
        base: &Hyperparameters,
        settings: &ModelSettings,
    ) -> Option<TuningResult> {
        self.optimize_with(series, base, |params, history| {
            fit_decomposition(&FitContext {
                series: history,
                holidays,
                params,
                settings,
            })
            .map(FittedModel::Decomposition)
        })
    }

    /// Search the grid with a caller-supplied fit
    ///
    /// `fit` is called once on the full series and once per fold for each
    /// combination. Combinations whose fit or cross-validation fails are
    /// skipped. Ties keep the earlier combination. Returns `None` when
    /// nothing could be scored, including when the history is too short for
    /// a single fold.
    pub fn optimize_with<F>(
        &self,
        series: &PreparedSeries,
        base: &Hyperparameters,
        mut fit: F,
    ) -> Option<TuningResult>
    where
        F: FnMut(&Hyperparameters, &PreparedSeries) -> Result<FittedModel>,
    {
        let combinations = self.config.grid.combinations(base);
        let deadline = self
            .config
            .time_limit_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        info!(combinations = combinations.len(), "Starting hyperparameter search");

        let mut best: Option<(Hyperparameters, f64)> = None;
        let mut evaluated = 0;
        let mut skipped = 0;

        for params in combinations {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(evaluated, "Tuning time limit reached, keeping best so far");
                break;
            }

            match self.score(series, &params, &mut fit) {
                Ok(score) => {
                    evaluated += 1;
                    debug!(?params, score, "Scored combination");
                    if best.as_ref().map_or(true, |(_, current)| score < *current) {
                        info!(
                            changepoint_prior_scale = params.changepoint_prior_scale,
                            seasonality_prior_scale = params.seasonality_prior_scale,
                            holidays_prior_scale = params.holidays_prior_scale,
                            mode = %params.seasonality_mode,
                            rmse = score,
                            "New best combination"
                        );
                        best = Some((params, score));
                    }
                }
                Err(e) => {
                    skipped += 1;
                    debug!(error = %e, "Skipping combination");
                }
            }
        }

        best.map(|(params, score)| TuningResult {
            params,
            score,
            evaluated,
            skipped,
        })
    }

    /// Mean cross-validated RMSE of one combination
    fn score<F>(&self, series: &PreparedSeries, params: &Hyperparameters, fit: &mut F) -> Result<f64>
    where
        F: FnMut(&Hyperparameters, &PreparedSeries) -> Result<FittedModel>,
    {
        fit(params, series)?;
        let metrics = cross_validate(series, &self.config.cross_validation, |history| {
            fit(params, history)
        })?;
        if !metrics.rmse.is_finite() {
            return Err(ForecastError::ConvergenceFailure(
                "Cross-validated RMSE is not finite".to_string(),
            ));
        }
        Ok(metrics.rmse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grid_has_128_combinations_mode_fastest() {
        let grid = TuningGrid::default();
        let combos = grid.combinations(&Hyperparameters::default());
        assert_eq!(combos.len(), 128);
        assert_eq!(combos[0].seasonality_mode, SeasonalityMode::Additive);
        assert_eq!(combos[1].seasonality_mode, SeasonalityMode::Multiplicative);
        assert_eq!(combos[0].changepoint_prior_scale, 0.001);
        assert_eq!(combos[127].changepoint_prior_scale, 0.5);
    }

    #[test]
    fn empty_grid_is_rejected() {
        let config = TuningConfig {
            grid: TuningGrid {
                seasonality_modes: Vec::new(),
                ..TuningGrid::default()
            },
            ..TuningConfig::default()
        };
        assert!(HyperparameterTuner::new(config).is_err());
    }
}
