use approx::assert_abs_diff_eq;
use chrono::{Duration, NaiveDate};
use demand_forecast::data::{Observation, PreparedSeries};
use demand_forecast::engine::{AnomalyKind, ForecastEngine, ModelArtifact, RegressorSchedule};
use demand_forecast::models::{ForecastMethod, Hyperparameters, ModelSettings, SeasonalityMode};
use demand_forecast::ForecastError;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
}

fn create_test_series(values: &[f64]) -> PreparedSeries {
    PreparedSeries::new(
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Observation::new(start() + Duration::days(i as i64), *v))
            .collect(),
        Vec::new(),
    )
}

/// Weekly pattern with a promotion every fifth day worth +25 units
fn create_promotion_series(days: i64) -> PreparedSeries {
    let observations = (0..days)
        .map(|i| {
            let date = start() + Duration::days(i);
            let promo = if i % 5 == 0 { 1.0 } else { 0.0 };
            let weekend = if i % 7 >= 5 { 30.0 } else { 0.0 };
            Observation::new(date, 80.0 + weekend + 25.0 * promo)
                .with_regressor("onpromotion", promo)
        })
        .collect();
    PreparedSeries::new(observations, vec!["onpromotion".to_string()])
}

fn fit(series: &PreparedSeries, params: &Hyperparameters) -> ModelArtifact {
    ModelArtifact::fit(series, &[], params, &ModelSettings::default()).unwrap()
}

fn additive() -> Hyperparameters {
    Hyperparameters {
        seasonality_mode: SeasonalityMode::Additive,
        yearly_seasonality: false,
        monthly_seasonality: false,
        ..Hyperparameters::default()
    }
}

#[rstest]
#[case(&[5.0], 1)]
#[case(&[1.0, 2.0, 3.0], 10)]
#[case(&[4.0, 0.0, 8.0, 2.0, 6.0, 4.0], 30)]
fn test_short_history_forecasts_mean(#[case] values: &[f64], #[case] horizon: usize) {
    let artifact = fit(&create_test_series(values), &Hyperparameters::default());
    let mean = values.iter().sum::<f64>() / values.len() as f64;

    let forecast = artifact.predict(horizon, false, &RegressorSchedule::new());

    assert_eq!(forecast.len(), horizon);
    assert_eq!(artifact.method(), &ForecastMethod::SimpleAverage);
    assert_eq!(artifact.method().label(), "Simple Average (Insufficient Data)");
    for point in &forecast {
        assert_abs_diff_eq!(point.point_estimate, mean, epsilon = 1e-12);
    }
}

#[test]
fn test_zero_history_forecasts_zero() {
    let series = create_test_series(&[0.0; 40]);
    let artifact = fit(&series, &Hyperparameters::default());

    let forecast = artifact.predict(14, false, &RegressorSchedule::new());

    assert_eq!(artifact.method().label(), "Zero Demand (Historical Data is all 0)");
    assert_eq!(forecast.len(), 14);
    assert_eq!(forecast[0].date, series.last_date().unwrap() + Duration::days(1));
    assert!(forecast.iter().all(|p| p.point_estimate == 0.0));
}

#[test]
fn test_seasonal_model_for_regular_history() {
    let artifact = fit(&create_promotion_series(120), &Hyperparameters::default());
    assert_eq!(
        artifact.method().label(),
        "Seasonal Decomposition (multiplicative)"
    );

    let forecast = artifact.predict(30, false, &RegressorSchedule::new());
    assert_eq!(forecast.len(), 30);
    for (i, point) in forecast.iter().enumerate() {
        assert_eq!(point.date, artifact.last_date() + Duration::days(i as i64 + 1));
        assert!(point.lower_bound <= point.point_estimate);
        assert!(point.point_estimate <= point.upper_bound);
        assert!(point.actual.is_none());
    }
}

#[test]
fn test_repeated_predictions_are_identical() {
    let artifact = fit(&create_promotion_series(90), &Hyperparameters::default());
    let first = artifact.predict(21, true, &RegressorSchedule::new());
    let second = artifact.predict(21, true, &RegressorSchedule::new());
    assert_eq!(first, second);
}

#[test]
fn test_forecast_iter_is_lazy_and_finite() {
    let artifact = fit(&create_promotion_series(90), &Hyperparameters::default());
    let schedule = RegressorSchedule::new();
    let mut iter = artifact.forecast_iter(3, &schedule);
    assert!(iter.next().is_some());
    assert_eq!(iter.count(), 2);
}

#[test]
fn test_simulation_pads_schedule_with_zero() {
    let artifact = fit(&create_promotion_series(120), &additive());

    let scenario = artifact.simulate_scenario(5, &[1.0, 1.0, 0.0]);
    let baseline = artifact.simulate_scenario(5, &[]);

    assert_eq!(scenario.len(), 5);
    for day in 0..2 {
        let uplift = scenario[day].point_estimate - baseline[day].point_estimate;
        assert!((uplift - 25.0).abs() < 3.0, "day {} uplift {}", day, uplift);
    }
    for day in 2..5 {
        assert_abs_diff_eq!(
            scenario[day].point_estimate,
            baseline[day].point_estimate,
            epsilon = 1e-9
        );
    }
}

#[test]
fn test_simulation_truncates_long_schedule() {
    let artifact = fit(&create_promotion_series(120), &additive());
    let scenario = artifact.simulate_scenario(2, &[1.0; 10]);
    assert_eq!(scenario.len(), 2);
    assert_eq!(scenario[0].date, artifact.last_date() + Duration::days(1));
}

#[test]
fn test_anomalies_flag_strictly_outside_points() {
    let artifact = fit(&create_promotion_series(120), &Hyperparameters::default());
    let anomalies = artifact.detect_anomalies(1.0).unwrap();
    let fitted = artifact.predict(0, true, &RegressorSchedule::new());

    for point in &fitted {
        let actual = point.actual.unwrap();
        let outside = actual > point.upper_bound || actual < point.lower_bound;
        let flagged = anomalies.iter().any(|a| a.date == point.date);
        assert_eq!(outside, flagged, "mismatch on {}", point.date);
    }
}

#[test]
fn test_boundary_values_are_not_anomalies() {
    // Zero history: every actual equals both bounds
    let artifact = fit(&create_test_series(&[0.0; 10]), &Hyperparameters::default());
    assert!(artifact.detect_anomalies(1.0).unwrap().is_empty());
}

#[test]
fn test_threshold_scales_interval() {
    // Mean 5, spread 5: bounds 5 ± 6.4 at threshold 1, 5 ± 3.2 at 0.5
    let artifact = fit(&create_test_series(&[0.0, 10.0]), &Hyperparameters::default());
    assert!(artifact.detect_anomalies(1.0).unwrap().is_empty());

    let anomalies = artifact.detect_anomalies(0.5).unwrap();
    assert_eq!(anomalies.len(), 2);
    assert_eq!(anomalies[0].kind, AnomalyKind::Drop);
    assert_eq!(anomalies[1].kind, AnomalyKind::Spike);
    assert_eq!(anomalies[1].kind.to_string(), "Unexpected Spike");
    assert_abs_diff_eq!(anomalies[0].expected, 5.0);
}

#[test]
fn test_feature_importance_describes_mode() {
    let additive_model = fit(&create_promotion_series(120), &additive());
    let importance = additive_model.feature_importance();
    assert_eq!(importance.len(), 1);
    assert_eq!(importance[0].regressor, "onpromotion");
    assert!((importance[0].coefficient - 25.0).abs() < 3.0);
    assert!(importance[0].description.starts_with("Adds "));
    assert!(importance[0].description.ends_with(" to baseline"));

    let multiplicative_model = fit(&create_promotion_series(120), &Hyperparameters::default());
    let importance = multiplicative_model.feature_importance();
    assert!(importance[0].coefficient > 0.0);
    assert!(importance[0].description.starts_with("Changes baseline by "));
    assert!(importance[0].description.ends_with('%'));
}

#[test]
fn test_components_cover_history_and_horizon() {
    let series = create_promotion_series(100);
    let artifact = fit(&series, &Hyperparameters::default());
    let components = artifact.components(15);

    assert_eq!(components.dates.len(), 115);
    assert_eq!(components.trend.len(), 115);
    assert_eq!(components.weekly.as_ref().map(Vec::len), Some(115));
    assert!(components.yearly.is_some());

    let no_yearly = Hyperparameters {
        yearly_seasonality: false,
        ..Hyperparameters::default()
    };
    let components = fit(&series, &no_yearly).components(15);
    assert!(components.yearly.is_none());
}

#[test]
fn test_engine_swaps_artifacts() {
    let engine = ForecastEngine::new();
    assert!(matches!(
        engine.simulate_scenario(3, &[]),
        Err(ForecastError::ModelNotTrained)
    ));

    let old = engine
        .fit(
            &create_test_series(&[2.0, 2.0]),
            &[],
            &Hyperparameters::default(),
            &ModelSettings::default(),
        )
        .unwrap();
    let reader = engine.current().unwrap();

    engine
        .fit(
            &create_test_series(&[0.0; 3]),
            &[],
            &Hyperparameters::default(),
            &ModelSettings::default(),
        )
        .unwrap();

    // A reader holding the previous artifact keeps a complete model
    assert_eq!(reader.method(), old.method());
    assert_eq!(
        engine.current().unwrap().method(),
        &ForecastMethod::ZeroDemand
    );
}
