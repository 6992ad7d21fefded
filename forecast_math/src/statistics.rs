//! Summary statistics used by the forecasting models
//!
//! Contains:
//! - Mean and population standard deviation
//! - Empirical quantiles and percentile clipping
//! - Trailing-window averages
//! - Gaussian multipliers for prediction intervals

use crate::{MathError, Result};
use statrs::distribution::{ContinuousCDF, Normal};

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation, `None` for an empty slice
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Mean of the last `window` values (or all of them when fewer are available)
pub fn trailing_mean(values: &[f64], window: usize) -> Result<f64> {
    if window == 0 {
        return Err(MathError::InvalidInput(
            "Window must be greater than zero".to_string(),
        ));
    }
    let start = values.len().saturating_sub(window);
    mean(&values[start..]).ok_or_else(|| {
        MathError::InsufficientData("No values for trailing average".to_string())
    })
}

/// Empirical quantile of `values` for `tau` in `[0, 1]`
///
/// Linear interpolation between closest ranks (Hyndman-Fan type 7), the
/// same rule as the default of pandas and numpy.
pub fn quantile(values: &[f64], tau: f64) -> Result<f64> {
    if values.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot take a quantile of an empty series".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&tau) {
        return Err(MathError::InvalidInput(format!(
            "Quantile must lie in [0, 1], got {}",
            tau
        )));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = tau * (sorted.len() - 1) as f64;
    let below = rank.floor() as usize;
    let above = rank.ceil() as usize;
    Ok(sorted[below] + (rank - below as f64) * (sorted[above] - sorted[below]))
}

/// Clip every value into the `[lower, upper]` empirical quantile range
///
/// Returns the bounds used together with the number of values that moved.
pub fn clip_to_quantiles(values: &mut [f64], lower: f64, upper: f64) -> Result<(f64, f64, usize)> {
    if lower > upper {
        return Err(MathError::InvalidInput(format!(
            "Lower quantile {} exceeds upper quantile {}",
            lower, upper
        )));
    }

    let low = quantile(values, lower)?;
    let high = quantile(values, upper)?;

    let mut clipped = 0;
    for value in values.iter_mut() {
        let bounded = value.clamp(low, high);
        if bounded != *value {
            *value = bounded;
            clipped += 1;
        }
    }

    Ok((low, high, clipped))
}

/// Two-sided standard-normal multiplier for a central interval of `width`
///
/// `interval_multiplier(0.8)` is roughly 1.2816.
pub fn interval_multiplier(width: f64) -> Result<f64> {
    if width <= 0.0 || width >= 1.0 {
        return Err(MathError::InvalidInput(
            "Interval width must be between 0 and 1".to_string(),
        ));
    }

    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| MathError::CalculationError(e.to_string()))?;
    Ok(normal.inverse_cdf(0.5 + width / 2.0))
}
