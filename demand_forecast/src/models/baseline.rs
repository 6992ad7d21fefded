//! Constant-level forecasting models
//!
//! Used for degenerate histories (all zero, too short) and as the fallback
//! when the decomposition model cannot be fitted.

use crate::error::{ForecastError, Result};
use crate::models::{Estimate, TrainedModel};
use chrono::NaiveDate;
use forecast_math::statistics::{interval_multiplier, mean, std_dev, trailing_mean};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Forecasts the same level for every day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantModel {
    /// Forecast level
    level: f64,
    /// Spread used for the interval
    sigma: f64,
    /// Interval multiplier
    z: f64,
}

impl ConstantModel {
    /// Constant zero forecast with a degenerate interval
    pub fn zero() -> Self {
        Self {
            level: 0.0,
            sigma: 0.0,
            z: 0.0,
        }
    }

    /// Mean of the whole history
    pub fn mean_of(values: &[f64], interval_width: f64) -> Result<Self> {
        let level = mean(values).ok_or_else(|| {
            ForecastError::InsufficientData("Empty history for average forecast".to_string())
        })?;

        Ok(Self {
            level,
            sigma: std_dev(values).unwrap_or(0.0),
            z: interval_multiplier(interval_width)?,
        })
    }

    /// Mean of the most recent `window` values
    pub fn moving_average(values: &[f64], window: usize, interval_width: f64) -> Result<Self> {
        let level = trailing_mean(values, window)?;
        let start = values.len().saturating_sub(window);

        Ok(Self {
            level,
            sigma: std_dev(&values[start..]).unwrap_or(0.0),
            z: interval_multiplier(interval_width)?,
        })
    }

    /// Forecast level
    pub fn level(&self) -> f64 {
        self.level
    }
}

impl TrainedModel for ConstantModel {
    fn estimate(&self, _date: NaiveDate, _regressors: &BTreeMap<String, f64>) -> Estimate {
        let margin = self.z * self.sigma;
        Estimate {
            point: self.level,
            lower: self.level - margin,
            upper: self.level + margin,
        }
    }

    fn components(&self, _date: NaiveDate) -> BTreeMap<String, f64> {
        BTreeMap::from([("trend".to_string(), self.level)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn moving_average_uses_trailing_window() {
        let values = [50.0, 50.0, 1.0, 2.0, 3.0];
        let model = ConstantModel::moving_average(&values, 3, 0.8).unwrap();
        assert_abs_diff_eq!(model.level(), 2.0);

        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let estimate = model.estimate(date, &BTreeMap::new());
        assert!(estimate.lower < estimate.point && estimate.point < estimate.upper);
    }

    #[test]
    fn zero_model_has_collapsed_interval() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let estimate = ConstantModel::zero().estimate(date, &BTreeMap::new());
        assert_eq!((estimate.point, estimate.lower, estimate.upper), (0.0, 0.0, 0.0));
    }
}
