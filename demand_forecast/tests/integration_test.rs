use chrono::{Duration, NaiveDate};
use demand_forecast::config::ForecastConfig;
use demand_forecast::data::HolidayEntry;
use demand_forecast::models::SeasonalityMode;
use demand_forecast::service::ForecastService;
use demand_forecast::sources::InMemoryCalendar;
use demand_forecast::synthetic::SyntheticHistory;
use demand_forecast::training::JobState;
use demand_forecast::tuning::TuningGrid;
use demand_forecast::{ForecastMethod, RegressorSchedule};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

fn christmas_calendar() -> Arc<InMemoryCalendar> {
    let holidays = [2022, 2023]
        .iter()
        .map(|year| HolidayEntry::new(NaiveDate::from_ymd_opt(*year, 12, 25).unwrap(), "Christmas"))
        .collect();
    Arc::new(InMemoryCalendar::new(holidays))
}

fn service_in(dir: &TempDir, config: ForecastConfig) -> ForecastService {
    ForecastService::new(
        ForecastConfig {
            model_dir: dir.path().to_path_buf(),
            ..config
        },
        Arc::new(SyntheticHistory::two_years(42).with_promotion_lift(40.0)),
        Some(christmas_calendar()),
    )
    .unwrap()
}

#[test]
fn test_two_year_history_end_to_end() {
    let dir = TempDir::new().unwrap();
    let service = service_in(&dir, ForecastConfig::default());

    service.train(false).unwrap().wait().unwrap();

    let status = service.training_status();
    assert_eq!(status.state, JobState::Completed, "error: {:?}", status.error);
    let trained = status.result.expect("two years supports evaluation");
    assert!(trained.folds > 0);
    assert_eq!(service.last_metrics(), Some(trained));

    let artifact = service.engine().current().unwrap();
    assert_eq!(
        artifact.method(),
        &ForecastMethod::SeasonalDecomposition {
            mode: SeasonalityMode::Multiplicative
        }
    );

    let metrics = service.evaluate().unwrap().expect("metrics");
    assert!(metrics.rmse >= 0.0);
    assert!(metrics.mae >= 0.0);
    assert!(metrics.mae <= metrics.rmse + 1e-9);
    assert!(metrics.mape.unwrap() >= 0.0);
    assert!((0.0..=1.0).contains(&metrics.coverage));

    let forecast = service.predict(30, false).unwrap();
    let last = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    assert_eq!(forecast.len(), 30);
    assert_eq!(forecast[0].date, last + Duration::days(1));
    for point in &forecast {
        assert!(point.lower_bound <= point.point_estimate);
        assert!(point.point_estimate <= point.upper_bound);
        // Demand sits between 80 and 250 units a day
        assert!(point.point_estimate > 50.0 && point.point_estimate < 300.0);
    }

    let with_history = service.predict(30, true).unwrap();
    assert_eq!(with_history.len(), 731 + 30);
    assert!(with_history[..731].iter().all(|p| p.actual.is_some()));

    let importance = service.feature_importance().unwrap();
    assert_eq!(importance.len(), 1);
    assert!(importance[0].coefficient > 0.0);

    let promoted = service.simulate(7, &[1.0; 7]).unwrap();
    for (scenario, baseline) in promoted.iter().zip(&forecast) {
        assert!(scenario.point_estimate > baseline.point_estimate);
    }

    let components = service.components(30).unwrap();
    assert_eq!(components.dates.len(), 761);
    assert!(components.weekly.is_some());
    assert!(components.yearly.is_some());

    for anomaly in service.detect_anomalies(1.0).unwrap() {
        let fitted = &with_history[(anomaly.date - with_history[0].date).num_days() as usize];
        assert_eq!(anomaly.actual, fitted.actual.unwrap());
        assert!(anomaly.actual > fitted.upper_bound || anomaly.actual < fitted.lower_bound);
    }
}

#[test]
fn test_saved_model_serves_a_new_service() {
    let dir = TempDir::new().unwrap();
    let first = service_in(&dir, ForecastConfig::default());
    first.train(false).unwrap().wait().unwrap();
    let expected = first.predict(14, false).unwrap();

    let second = service_in(&dir, ForecastConfig::default());
    assert!(!second.engine().is_trained());
    assert_eq!(second.last_metrics(), first.last_metrics());

    let schedule = RegressorSchedule::new();
    assert_eq!(second.predict_with(14, false, &schedule).unwrap(), expected);
    assert_eq!(second.training_status().state, JobState::Idle);
}

#[test]
fn test_auto_tune_picks_grid_member() {
    let dir = TempDir::new().unwrap();
    let mut config = ForecastConfig::default();
    config.tuning.grid = TuningGrid {
        changepoint_prior_scales: vec![0.01, 0.1],
        seasonality_prior_scales: vec![10.0],
        holidays_prior_scales: vec![10.0],
        seasonality_modes: vec![SeasonalityMode::Additive, SeasonalityMode::Multiplicative],
    };
    let service = service_in(&dir, config);

    service.train(true).unwrap().wait().unwrap();

    assert_eq!(service.training_status().state, JobState::Completed);
    let params = service.engine().current().unwrap().hyperparameters().clone();
    assert!([0.01, 0.1].contains(&params.changepoint_prior_scale));
    assert_eq!(params.seasonality_prior_scale, 10.0);
}
