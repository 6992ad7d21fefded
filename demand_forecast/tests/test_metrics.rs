use approx::assert_abs_diff_eq;
use chrono::{Duration, NaiveDate};
use demand_forecast::data::{Observation, PreparedSeries};
use demand_forecast::engine::ModelArtifact;
use demand_forecast::metrics::{cross_validate, CrossValidationConfig, EvaluationMetrics};
use demand_forecast::models::{ConstantModel, FittedModel, Hyperparameters, ModelSettings};
use demand_forecast::ForecastError;
use rstest::rstest;

fn create_test_series(values: impl IntoIterator<Item = f64>) -> PreparedSeries {
    let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
    PreparedSeries::new(
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| Observation::new(start + Duration::days(i as i64), v))
            .collect(),
        Vec::new(),
    )
}

fn config(initial: i64, period: i64, horizon: i64) -> CrossValidationConfig {
    CrossValidationConfig {
        initial_days: initial,
        period_days: period,
        horizon_days: horizon,
    }
}

#[test]
fn test_constant_forecast_errors() {
    // History alternates 8 and 12; a mean forecast of 10 misses by 2 everywhere
    let series = create_test_series((0..60).map(|i| if i % 2 == 0 { 8.0 } else { 12.0 }));
    let metrics = cross_validate(&series, &config(20, 10, 10), |history| {
        ConstantModel::mean_of(&history.values(), 0.8).map(FittedModel::Constant)
    })
    .unwrap();

    assert_eq!(metrics.folds, 3);
    assert_abs_diff_eq!(metrics.rmse, 2.0, epsilon = 0.1);
    assert_abs_diff_eq!(metrics.mae, 2.0, epsilon = 0.1);
    let mape = metrics.mape.unwrap();
    assert!(mape > 0.15 && mape < 0.25);
    assert!(metrics.coverage >= 0.0 && metrics.coverage <= 1.0);
}

#[test]
fn test_zero_actuals_excluded_from_mape() {
    let series = create_test_series(std::iter::repeat(0.0).take(50));
    let metrics = cross_validate(&series, &config(20, 10, 10), |_| {
        Ok(FittedModel::Constant(ConstantModel::zero()))
    })
    .unwrap();

    assert_eq!(metrics.mape, None);
    assert_eq!(metrics.rmse, 0.0);
    // Actuals sit exactly on the collapsed bounds, which counts as covered
    assert_eq!(metrics.coverage, 1.0);
}

#[rstest]
#[case(30, config(20, 10, 10))]
#[case(100, CrossValidationConfig::default())]
#[case(400, CrossValidationConfig::default())]
fn test_cutoff_count(#[case] days: usize, #[case] cv: CrossValidationConfig) {
    let series = create_test_series(std::iter::repeat(1.0).take(days));
    let cutoffs = cv.cutoffs(&series);
    let expected = match days {
        30 => 0,
        100 => 0,
        // last - 30 = day 369, then every 30 days back while >= day 365
        _ => 1,
    };
    assert_eq!(cutoffs.len(), expected);
}

#[test]
fn test_artifact_evaluate_unavailable_on_short_history() {
    let series = create_test_series((0..90).map(|i| 50.0 + (i % 7) as f64));
    let artifact = ModelArtifact::fit(
        &series,
        &[],
        &Hyperparameters::default(),
        &ModelSettings::default(),
    )
    .unwrap();

    let result = artifact.evaluate(&CrossValidationConfig::default());
    assert!(matches!(result, Err(ForecastError::EvaluationUnavailable(_))));
}

#[test]
fn test_metrics_display_and_accuracy() {
    let metrics = EvaluationMetrics {
        rmse: 3.5,
        mae: 2.25,
        mape: Some(0.12),
        coverage: 0.8,
        folds: 4,
    };
    assert_abs_diff_eq!(metrics.accuracy().unwrap(), 0.88, epsilon = 1e-12);

    let text = metrics.to_string();
    assert!(text.contains("4 folds"));
    assert!(text.contains("RMSE:     3.5000"));
    assert!(text.contains("MAPE:     12.00%"));
    assert!(text.contains("Accuracy: 88.00%"));
}

#[test]
fn test_metrics_serialize_as_flat_record() {
    let metrics = EvaluationMetrics {
        rmse: 1.0,
        mae: 0.5,
        mape: None,
        coverage: 0.9,
        folds: 2,
    };
    let json = serde_json::to_value(&metrics).unwrap();
    assert_eq!(json["rmse"], 1.0);
    assert!(json["mape"].is_null());
    assert_eq!(json["folds"], 2);
}
