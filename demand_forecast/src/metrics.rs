//! Rolling-origin cross-validation and evaluation metrics

use crate::data::PreparedSeries;
use crate::error::{ForecastError, Result};
use crate::models::{FittedModel, TrainedModel};
use crate::utils::forecast_accuracy;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Window sizes of rolling-origin cross-validation, in days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossValidationConfig {
    /// Minimum training span before the first cutoff
    pub initial_days: i64,
    /// Spacing between cutoffs
    pub period_days: i64,
    /// Days forecast after each cutoff
    pub horizon_days: i64,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            initial_days: 365,
            period_days: 30,
            horizon_days: 30,
        }
    }
}

impl CrossValidationConfig {
    /// Sparser windows used while tuning
    pub fn tuning() -> Self {
        Self {
            initial_days: 365,
            period_days: 90,
            horizon_days: 30,
        }
    }

    /// Reject non-positive windows
    pub fn validate(&self) -> Result<()> {
        if self.initial_days <= 0 || self.period_days <= 0 || self.horizon_days <= 0 {
            return Err(ForecastError::InvalidParameter(format!(
                "Cross-validation windows must be positive, got initial={} period={} horizon={}",
                self.initial_days, self.period_days, self.horizon_days
            )));
        }
        Ok(())
    }

    /// Cutoff dates in ascending order
    ///
    /// Walks back from `last - horizon` in steps of `period` while the cutoff
    /// leaves at least `initial` days of training history.
    pub fn cutoffs(&self, series: &PreparedSeries) -> Vec<NaiveDate> {
        let (Some(first), Some(last)) = (series.first_date(), series.last_date()) else {
            return Vec::new();
        };
        let earliest = first + Duration::days(self.initial_days);

        let mut cutoffs = Vec::new();
        let mut cutoff = last - Duration::days(self.horizon_days);
        while cutoff >= earliest {
            cutoffs.push(cutoff);
            cutoff = cutoff - Duration::days(self.period_days);
        }
        cutoffs.reverse();
        cutoffs
    }
}

/// Errors of a single cross-validation fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    /// Last training day of the fold
    pub cutoff: NaiveDate,
    /// Number of forecast days scored
    pub points: usize,
    pub rmse: f64,
    pub mae: f64,
    /// `None` when every actual in the fold is zero
    pub mape: Option<f64>,
    pub coverage: f64,
}

/// Cross-validated evaluation, averaged over folds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Absolute Percentage Error as a fraction, absent if no fold had a non-zero actual
    pub mape: Option<f64>,
    /// Share of actuals inside the prediction interval
    pub coverage: f64,
    /// Number of folds averaged
    pub folds: usize,
}

impl EvaluationMetrics {
    /// Average per-fold metrics; `None` without folds
    pub fn aggregate(folds: &[FoldMetrics]) -> Option<Self> {
        if folds.is_empty() {
            return None;
        }
        let n = folds.len() as f64;
        let mapes: Vec<f64> = folds.iter().filter_map(|f| f.mape).collect();

        Some(Self {
            rmse: folds.iter().map(|f| f.rmse).sum::<f64>() / n,
            mae: folds.iter().map(|f| f.mae).sum::<f64>() / n,
            mape: if mapes.is_empty() {
                None
            } else {
                Some(mapes.iter().sum::<f64>() / mapes.len() as f64)
            },
            coverage: folds.iter().map(|f| f.coverage).sum::<f64>() / n,
            folds: folds.len(),
        })
    }

    /// `1 - MAPE`, floored at zero
    pub fn accuracy(&self) -> Option<f64> {
        self.mape.map(|mape| (1.0 - mape).max(0.0))
    }
}

impl fmt::Display for EvaluationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cross-Validation Metrics ({} folds):", self.folds)?;
        writeln!(f, "  RMSE:     {:.4}", self.rmse)?;
        writeln!(f, "  MAE:      {:.4}", self.mae)?;
        match self.mape {
            Some(mape) => writeln!(f, "  MAPE:     {:.2}%", mape * 100.0)?,
            None => writeln!(f, "  MAPE:     n/a")?,
        }
        writeln!(f, "  Coverage: {:.2}%", self.coverage * 100.0)?;
        if let Some(accuracy) = self.accuracy() {
            writeln!(f, "  Accuracy: {:.2}%", accuracy * 100.0)?;
        }
        Ok(())
    }
}

/// Run rolling-origin cross-validation
///
/// `fit` is called once per cutoff with the history up to and including the
/// cutoff. Its errors abort the run. Each fold is scored on the observed days
/// in `(cutoff, cutoff + horizon]`, using the regressor values recorded on
/// those days.
pub fn cross_validate<F>(
    series: &PreparedSeries,
    config: &CrossValidationConfig,
    mut fit: F,
) -> Result<EvaluationMetrics>
where
    F: FnMut(&PreparedSeries) -> Result<FittedModel>,
{
    config.validate()?;
    let cutoffs = config.cutoffs(series);
    if cutoffs.is_empty() {
        return Err(ForecastError::EvaluationUnavailable(format!(
            "History of {} days is too short for initial={} and horizon={}",
            series.len(),
            config.initial_days,
            config.horizon_days
        )));
    }

    let mut folds = Vec::with_capacity(cutoffs.len());
    for cutoff in cutoffs {
        let test = series.window(cutoff, cutoff + Duration::days(config.horizon_days));
        if test.is_empty() {
            continue;
        }
        let model = fit(&series.until(cutoff))?;

        let estimates: Vec<_> = test
            .iter()
            .map(|o| model.estimate(o.date, &o.regressors))
            .collect();
        let actual: Vec<f64> = test.iter().map(|o| o.value).collect();
        let accuracy = forecast_accuracy(
            &estimates.iter().map(|e| e.point).collect::<Vec<_>>(),
            &actual,
            &estimates.iter().map(|e| e.lower).collect::<Vec<_>>(),
            &estimates.iter().map(|e| e.upper).collect::<Vec<_>>(),
        )?;

        debug!(%cutoff, points = test.len(), rmse = accuracy.rmse, "Scored fold");
        folds.push(FoldMetrics {
            cutoff,
            points: test.len(),
            rmse: accuracy.rmse,
            mae: accuracy.mae,
            mape: accuracy.mape,
            coverage: accuracy.coverage,
        });
    }

    EvaluationMetrics::aggregate(&folds).ok_or_else(|| {
        ForecastError::EvaluationUnavailable("No fold had observations to score".to_string())
    })
}
