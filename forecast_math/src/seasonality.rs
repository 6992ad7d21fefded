//! Fourier seasonal features
//!
//! A seasonal pattern with period `P` is represented by the partial Fourier
//! sum `Σ aₙ cos(2πnt/P) + bₙ sin(2πnt/P)` for `n = 1..=order`.

use crate::{MathError, Result};
use std::f64::consts::PI;

/// Fourier features for a single time point, `2 * order` values
///
/// Values are laid out as `[sin(1), cos(1), sin(2), cos(2), ...]`.
pub fn fourier_row(t_days: f64, period: f64, order: usize) -> Vec<f64> {
    let mut row = Vec::with_capacity(2 * order);
    for n in 1..=order {
        let angle = 2.0 * PI * n as f64 * t_days / period;
        row.push(angle.sin());
        row.push(angle.cos());
    }
    row
}

/// Fourier features for every time point
pub fn fourier_features(t_days: &[f64], period: f64, order: usize) -> Result<Vec<Vec<f64>>> {
    if period <= 0.0 || !period.is_finite() {
        return Err(MathError::InvalidInput(format!(
            "Seasonal period must be positive, got {}",
            period
        )));
    }
    if order == 0 {
        return Err(MathError::InvalidInput(
            "Fourier order must be at least 1".to_string(),
        ));
    }

    Ok(t_days
        .iter()
        .map(|&t| fourier_row(t, period, order))
        .collect())
}

/// Evaluate a fitted seasonal term at a single time point
pub fn seasonal_value(t_days: f64, period: f64, coefficients: &[f64]) -> f64 {
    let order = coefficients.len() / 2;
    fourier_row(t_days, period, order)
        .iter()
        .zip(coefficients)
        .map(|(x, beta)| x * beta)
        .sum()
}
