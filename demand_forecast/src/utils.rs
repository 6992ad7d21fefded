//! Utility functions for the demand_forecast crate

use crate::error::{ForecastError, Result};
use chrono::{Days, NaiveDate};

/// The `horizon` days following `last_date`, produced lazily
///
/// Stops early at the last representable date.
pub fn future_dates(last_date: NaiveDate, horizon: usize) -> impl Iterator<Item = NaiveDate> {
    (1..=horizon as u64).map_while(move |offset| last_date.checked_add_days(Days::new(offset)))
}

/// Every day from `start` to `end`, both inclusive
pub fn date_range(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |date| *date <= end)
}

/// Error statistics of a forecast against actual values
pub fn forecast_accuracy(
    forecast: &[f64],
    actual: &[f64],
    lower: &[f64],
    upper: &[f64],
) -> Result<ForecastAccuracy> {
    let n = actual.len();
    if n == 0 || forecast.len() != n || lower.len() != n || upper.len() != n {
        return Err(ForecastError::DataError(
            "Forecast, bounds and actual values must have the same non-zero length".to_string(),
        ));
    }
    let count = n as f64;

    let errors: Vec<f64> = forecast
        .iter()
        .zip(actual)
        .map(|(&f, &a)| a - f)
        .collect();

    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / count;
    let rmse = (errors.iter().map(|e| e.powi(2)).sum::<f64>() / count).sqrt();

    // Zero actuals are excluded from MAPE
    let percentage: Vec<f64> = actual
        .iter()
        .zip(&errors)
        .filter(|(&a, _)| a != 0.0)
        .map(|(&a, &e)| e.abs() / a.abs())
        .collect();
    let mape = if percentage.is_empty() {
        None
    } else {
        Some(percentage.iter().sum::<f64>() / percentage.len() as f64)
    };

    let covered = actual
        .iter()
        .zip(lower.iter().zip(upper))
        .filter(|(&a, (&lo, &hi))| lo <= a && a <= hi)
        .count();

    Ok(ForecastAccuracy {
        mae,
        rmse,
        mape,
        coverage: covered as f64 / count,
    })
}

/// Forecast accuracy of a single window
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastAccuracy {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error as a fraction, `None` if every actual is zero
    pub mape: Option<f64>,
    /// Share of actual values inside the interval
    pub coverage: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn future_dates_start_the_day_after() {
        let last = NaiveDate::from_ymd_opt(2023, 12, 30).unwrap();
        let dates: Vec<NaiveDate> = future_dates(last, 3).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            ]
        );
        assert_eq!(future_dates(last, 0).count(), 0);
    }

    #[test]
    fn future_dates_stop_at_the_calendar_end() {
        let last = NaiveDate::MAX.pred_opt().unwrap().pred_opt().unwrap();
        let dates: Vec<NaiveDate> = future_dates(last, usize::MAX).collect();
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[1], NaiveDate::MAX);
    }

    #[test]
    fn future_dates_are_lazy() {
        let last = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut dates = future_dates(last, usize::MAX);
        assert_eq!(dates.next(), NaiveDate::from_ymd_opt(2024, 1, 2));
    }

    #[test]
    fn date_range_is_inclusive() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(date_range(start, end).count(), 3);
        assert_eq!(date_range(end, start).count(), 0);
    }

    #[test]
    fn accuracy_skips_zero_actuals_in_mape() {
        let accuracy = forecast_accuracy(
            &[10.0, 5.0],
            &[8.0, 0.0],
            &[8.0, 1.0],
            &[12.0, 9.0],
        )
        .unwrap();
        assert_abs_diff_eq!(accuracy.mae, 3.5);
        assert_abs_diff_eq!(accuracy.mape.unwrap(), 0.25);
        assert_abs_diff_eq!(accuracy.coverage, 0.5);
    }

    #[test]
    fn all_zero_actuals_have_no_mape() {
        let accuracy = forecast_accuracy(&[1.0], &[0.0], &[0.0], &[2.0]).unwrap();
        assert_eq!(accuracy.mape, None);
        assert_abs_diff_eq!(accuracy.coverage, 1.0);
    }
}
