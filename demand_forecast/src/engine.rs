//! Forecast engine: the fitted model artifact and its owner
//!
//! A [`ModelArtifact`] is immutable once fitted. The [`ForecastEngine`]
//! holds the current artifact behind an `Arc` and replaces it as a whole, so
//! readers always see either the previous or the new model in full.

use crate::data::{HolidayEntry, PreparedSeries};
use crate::error::{ForecastError, Result};
use crate::metrics::{cross_validate, CrossValidationConfig, EvaluationMetrics};
use crate::models::strategy::{fit_with_ladder, FitContext};
use crate::models::{
    Estimate, FittedModel, ForecastMethod, ForecastPoint, Hyperparameters, ModelSettings,
    SeasonalityMode, TrainedModel,
};
use crate::persistence::ModelStore;
use crate::utils::future_dates;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Longest horizon, in days, the engine serves
pub const MAX_HORIZON_DAYS: usize = 3_660;

/// Future values per regressor, one entry per forecast day
///
/// Days past the end of a schedule, and regressors without one, are 0.
pub type RegressorSchedule = BTreeMap<String, Vec<f64>>;

/// Direction of an anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyKind {
    /// Actual above the upper bound
    Spike,
    /// Actual below the lower bound
    Drop,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyKind::Spike => write!(f, "Unexpected Spike"),
            AnomalyKind::Drop => write!(f, "Unexpected Drop"),
        }
    }
}

/// Historical observation outside its expected range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub date: NaiveDate,
    pub actual: f64,
    pub expected: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub kind: AnomalyKind,
}

/// Fitted effect of one exogenous regressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub regressor: String,
    pub coefficient: f64,
    pub description: String,
}

/// Per-day decomposition of the forecast
///
/// Seasonal components are `None` when the model has no such term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Components {
    pub dates: Vec<NaiveDate>,
    pub trend: Vec<f64>,
    pub yearly: Option<Vec<f64>>,
    pub weekly: Option<Vec<f64>>,
}

/// A fitted model with everything needed to forecast from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    model: FittedModel,
    method: ForecastMethod,
    hyperparameters: Hyperparameters,
    settings: ModelSettings,
    regressor_names: Vec<String>,
    holidays: Vec<HolidayEntry>,
    history: PreparedSeries,
    last_date: NaiveDate,
    trained_at: DateTime<Utc>,
}

impl ModelArtifact {
    /// Fit a model on a prepared series
    ///
    /// Only an empty series or invalid settings fail; degenerate histories
    /// and failed decomposition fits are recovered by the fitting ladder.
    pub fn fit(
        series: &PreparedSeries,
        holidays: &[HolidayEntry],
        hyperparameters: &Hyperparameters,
        settings: &ModelSettings,
    ) -> Result<Self> {
        hyperparameters.validate()?;
        settings.validate()?;
        let last_date = series.last_date().ok_or_else(|| {
            ForecastError::InsufficientData("Cannot fit an empty series".to_string())
        })?;

        let (model, method) = fit_with_ladder(&FitContext {
            series,
            holidays,
            params: hyperparameters,
            settings,
        })?;

        Ok(Self {
            model,
            method,
            hyperparameters: hyperparameters.clone(),
            settings: settings.clone(),
            regressor_names: series.regressor_names().to_vec(),
            holidays: holidays.to_vec(),
            history: series.clone(),
            last_date,
            trained_at: Utc::now(),
        })
    }

    /// How the model forecasts
    pub fn method(&self) -> &ForecastMethod {
        &self.method
    }

    /// Hyperparameters the model was fitted with
    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    /// Registered regressor names
    pub fn regressor_names(&self) -> &[String] {
        &self.regressor_names
    }

    /// Series the model was fitted on
    pub fn history(&self) -> &PreparedSeries {
        &self.history
    }

    /// Last training day
    pub fn last_date(&self) -> NaiveDate {
        self.last_date
    }

    /// When the model was fitted
    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Estimate for one day with explicit regressor values
    pub fn estimate_at(&self, date: NaiveDate, regressors: &BTreeMap<String, f64>) -> Estimate {
        self.model.estimate(date, regressors)
    }

    /// Lazily forecast the `horizon` days after the last training day
    pub fn forecast_iter<'a>(
        &'a self,
        horizon: usize,
        schedule: &'a RegressorSchedule,
    ) -> impl Iterator<Item = ForecastPoint> + 'a {
        future_dates(self.last_date, horizon)
            .enumerate()
            .map(move |(day, date)| {
                let regressors = self.regressors_on_day(schedule, day);
                ForecastPoint::from_estimate(date, self.model.estimate(date, &regressors), None)
            })
    }

    /// Forecast the next `horizon` days
    ///
    /// With `include_history` the fitted values for every training day come
    /// first, each carrying its actual value.
    pub fn predict(
        &self,
        horizon: usize,
        include_history: bool,
        schedule: &RegressorSchedule,
    ) -> Vec<ForecastPoint> {
        let mut points: Vec<ForecastPoint> = if include_history {
            self.fitted_history().collect()
        } else {
            Vec::new()
        };
        points.extend(self.forecast_iter(horizon, schedule));
        points
    }

    /// Forecast with the primary regressor following `schedule`
    ///
    /// The schedule is padded with 0 or truncated to `days`. Without any
    /// registered regressor the schedule has no effect.
    pub fn simulate_scenario(&self, days: usize, schedule: &[f64]) -> Vec<ForecastPoint> {
        let mut scenario = RegressorSchedule::new();
        if let Some(primary) = self.regressor_names.first() {
            scenario.insert(primary.clone(), schedule.to_vec());
        }
        self.simulate_with(days, &scenario)
    }

    /// Forecast the next `days` under an arbitrary regressor schedule
    pub fn simulate_with(&self, days: usize, schedule: &RegressorSchedule) -> Vec<ForecastPoint> {
        debug!(days, regressors = schedule.len(), "Simulating scenario");
        self.forecast_iter(days, schedule).collect()
    }

    /// Historical observations outside their expected range
    ///
    /// Each side of the interval is stretched by `threshold` around the point
    /// estimate; 1.0 keeps the model's own bounds. A point exactly on a bound
    /// is not flagged.
    pub fn detect_anomalies(&self, threshold: f64) -> Result<Vec<Anomaly>> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "Anomaly threshold must be positive, got {}",
                threshold
            )));
        }

        let anomalies: Vec<Anomaly> = self
            .history
            .observations()
            .iter()
            .filter_map(|o| {
                let e = self.model.estimate(o.date, &o.regressors);
                let lower = e.lower + (1.0 - threshold) * (e.point - e.lower);
                let upper = e.upper - (1.0 - threshold) * (e.upper - e.point);
                let kind = if o.value > upper {
                    AnomalyKind::Spike
                } else if o.value < lower {
                    AnomalyKind::Drop
                } else {
                    return None;
                };
                Some(Anomaly {
                    date: o.date,
                    actual: o.value,
                    expected: e.point,
                    lower_bound: lower,
                    upper_bound: upper,
                    kind,
                })
            })
            .collect();

        info!(threshold, anomalies = anomalies.len(), "Anomaly scan complete");
        Ok(anomalies)
    }

    /// Trend and seasonal components over the history plus `days` ahead
    pub fn components(&self, days: usize) -> Components {
        let dates: Vec<NaiveDate> = self
            .history
            .dates()
            .into_iter()
            .chain(future_dates(self.last_date, days))
            .collect();
        let rows: Vec<BTreeMap<String, f64>> =
            dates.iter().map(|&d| self.model.components(d)).collect();

        let column = |name: &str| -> Option<Vec<f64>> {
            rows.iter().map(|row| row.get(name).copied()).collect()
        };

        Components {
            trend: column("trend").unwrap_or_else(|| vec![0.0; dates.len()]),
            yearly: column("yearly"),
            weekly: column("weekly"),
            dates,
        }
    }

    /// Fitted effect of every registered regressor
    pub fn feature_importance(&self) -> Vec<FeatureImportance> {
        let mode = match &self.method {
            ForecastMethod::SeasonalDecomposition { mode } => *mode,
            _ => self.hyperparameters.seasonality_mode,
        };

        self.regressor_names
            .iter()
            .map(|name| {
                let coefficient = self.model.regressor_coefficient(name).unwrap_or(0.0);
                let description = match mode {
                    SeasonalityMode::Additive => format!("Adds {:.2} to baseline", coefficient),
                    SeasonalityMode::Multiplicative => {
                        format!("Changes baseline by {:.2}%", coefficient * 100.0)
                    }
                };
                FeatureImportance {
                    regressor: name.clone(),
                    coefficient,
                    description,
                }
            })
            .collect()
    }

    /// Cross-validate the artifact's configuration on its own history
    ///
    /// Each fold is refitted with the same fitting ladder as training.
    pub fn evaluate(&self, config: &CrossValidationConfig) -> Result<EvaluationMetrics> {
        let metrics = cross_validate(&self.history, config, |history| {
            fit_with_ladder(&FitContext {
                series: history,
                holidays: &self.holidays,
                params: &self.hyperparameters,
                settings: &self.settings,
            })
            .map(|(model, _)| model)
        })?;
        info!(rmse = metrics.rmse, mae = metrics.mae, folds = metrics.folds, "Evaluation complete");
        Ok(metrics)
    }

    fn fitted_history(&self) -> impl Iterator<Item = ForecastPoint> + '_ {
        self.history.observations().iter().map(move |o| {
            ForecastPoint::from_estimate(
                o.date,
                self.model.estimate(o.date, &o.regressors),
                Some(o.value),
            )
        })
    }

    fn regressors_on_day(&self, schedule: &RegressorSchedule, day: usize) -> BTreeMap<String, f64> {
        self.regressor_names
            .iter()
            .map(|name| {
                let value = schedule
                    .get(name)
                    .and_then(|values| values.get(day))
                    .copied()
                    .unwrap_or(0.0);
                (name.clone(), value)
            })
            .collect()
    }
}

/// Owner of the current model artifact
///
/// Reads clone the `Arc` and release the lock at once, so a long prediction
/// never blocks a model swap and vice versa.
#[derive(Debug, Default)]
pub struct ForecastEngine {
    artifact: RwLock<Option<Arc<ModelArtifact>>>,
    store: Option<ModelStore>,
}

impl ForecastEngine {
    /// Engine without durable storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine that lazily loads its model from `store`
    pub fn with_store(store: ModelStore) -> Self {
        Self {
            artifact: RwLock::new(None),
            store: Some(store),
        }
    }

    /// Backing store, if any
    pub fn store(&self) -> Option<&ModelStore> {
        self.store.as_ref()
    }

    /// Fit a new artifact and install it
    pub fn fit(
        &self,
        series: &PreparedSeries,
        holidays: &[HolidayEntry],
        hyperparameters: &Hyperparameters,
        settings: &ModelSettings,
    ) -> Result<Arc<ModelArtifact>> {
        let artifact = Arc::new(ModelArtifact::fit(
            series,
            holidays,
            hyperparameters,
            settings,
        )?);
        self.install(Arc::clone(&artifact));
        Ok(artifact)
    }

    /// Replace the current artifact
    pub fn install(&self, artifact: Arc<ModelArtifact>) {
        info!(method = %artifact.method(), "Installing model artifact");
        let mut slot = self.artifact.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(artifact);
    }

    /// Whether an artifact is installed, without touching storage
    pub fn is_trained(&self) -> bool {
        self.artifact
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Current artifact, loading it from storage on first use
    pub fn current(&self) -> Result<Arc<ModelArtifact>> {
        if let Some(artifact) = self
            .artifact
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            return Ok(Arc::clone(artifact));
        }

        let store = self.store.as_ref().ok_or(ForecastError::ModelNotTrained)?;
        let loaded = store.load()?.ok_or(ForecastError::ModelNotTrained)?;

        let mut slot = self.artifact.write().unwrap_or_else(|e| e.into_inner());
        // A concurrent fit may have installed a newer artifact meanwhile
        let artifact = slot.get_or_insert_with(|| Arc::new(loaded));
        Ok(Arc::clone(artifact))
    }

    /// Forecast the next `horizon` days
    pub fn predict(
        &self,
        horizon: usize,
        include_history: bool,
        schedule: &RegressorSchedule,
    ) -> Result<Vec<ForecastPoint>> {
        check_horizon(horizon)?;
        Ok(self.current()?.predict(horizon, include_history, schedule))
    }

    /// What-if forecast with the primary regressor following `schedule`
    pub fn simulate_scenario(&self, days: usize, schedule: &[f64]) -> Result<Vec<ForecastPoint>> {
        check_horizon(days)?;
        Ok(self.current()?.simulate_scenario(days, schedule))
    }

    /// Cross-validated evaluation of the current model
    pub fn evaluate(&self, config: &CrossValidationConfig) -> Result<EvaluationMetrics> {
        self.current()?.evaluate(config)
    }

    /// Flag historical anomalies
    pub fn detect_anomalies(&self, threshold: f64) -> Result<Vec<Anomaly>> {
        self.current()?.detect_anomalies(threshold)
    }

    /// Regressor coefficients with readable descriptions
    pub fn feature_importance(&self) -> Result<Vec<FeatureImportance>> {
        Ok(self.current()?.feature_importance())
    }

    /// Forecast decomposition
    pub fn components(&self, days: usize) -> Result<Components> {
        check_horizon(days)?;
        Ok(self.current()?.components(days))
    }
}

fn check_horizon(days: usize) -> Result<()> {
    if days > MAX_HORIZON_DAYS {
        return Err(ForecastError::InvalidParameter(format!(
            "Horizon of {} days exceeds the maximum of {}",
            days, MAX_HORIZON_DAYS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Observation;
    use chrono::Duration;

    fn series(values: &[f64]) -> PreparedSeries {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        PreparedSeries::new(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| Observation::new(start + Duration::days(i as i64), *v))
                .collect(),
            Vec::new(),
        )
    }

    #[test]
    fn untrained_engine_reports_not_trained() {
        let engine = ForecastEngine::new();
        assert!(!engine.is_trained());
        assert!(matches!(
            engine.predict(3, false, &RegressorSchedule::new()),
            Err(ForecastError::ModelNotTrained)
        ));
    }

    #[test]
    fn include_history_prepends_actuals() {
        let artifact = ModelArtifact::fit(
            &series(&[2.0, 4.0, 6.0]),
            &[],
            &Hyperparameters::default(),
            &ModelSettings::default(),
        )
        .unwrap();
        let points = artifact.predict(2, true, &RegressorSchedule::new());
        assert_eq!(points.len(), 5);
        assert_eq!(points[0].actual, Some(2.0));
        assert_eq!(points[4].actual, None);
        assert_eq!(points[3].date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    }

    #[test]
    fn horizon_past_the_limit_is_rejected() {
        let engine = ForecastEngine::new();
        engine
            .fit(
                &series(&[1.0, 2.0, 3.0]),
                &[],
                &Hyperparameters::default(),
                &ModelSettings::default(),
            )
            .unwrap();
        let schedule = RegressorSchedule::new();

        assert_eq!(
            engine.predict(MAX_HORIZON_DAYS, false, &schedule).unwrap().len(),
            MAX_HORIZON_DAYS
        );
        for result in [
            engine.predict(MAX_HORIZON_DAYS + 1, false, &schedule).map(|_| ()),
            engine.predict(200_000_000, true, &schedule).map(|_| ()),
            engine.simulate_scenario(usize::MAX, &[]).map(|_| ()),
            engine.components(MAX_HORIZON_DAYS + 1).map(|_| ()),
        ] {
            assert!(matches!(result, Err(ForecastError::InvalidParameter(_))));
        }
    }

    #[test]
    fn forecast_iter_ends_at_the_calendar_limit() {
        let last = NaiveDate::MAX.pred_opt().unwrap();
        let history = PreparedSeries::new(
            vec![
                Observation::new(last.pred_opt().unwrap(), 4.0),
                Observation::new(last, 6.0),
            ],
            Vec::new(),
        );
        let artifact = ModelArtifact::fit(
            &history,
            &[],
            &Hyperparameters::default(),
            &ModelSettings::default(),
        )
        .unwrap();
        let schedule = RegressorSchedule::new();

        let points: Vec<ForecastPoint> = artifact.forecast_iter(200_000_000, &schedule).collect();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].date, NaiveDate::MAX);
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let artifact = ModelArtifact::fit(
            &series(&[1.0, 2.0]),
            &[],
            &Hyperparameters::default(),
            &ModelSettings::default(),
        )
        .unwrap();
        assert!(artifact.detect_anomalies(-1.0).is_err());
    }
}
