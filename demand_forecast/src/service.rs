//! Forecast service: the operations exposed to the serving layer
//!
//! Training runs on a background thread behind the single-flight
//! [`TrainingCoordinator`]. Reads go straight to the [`ForecastEngine`] and
//! never wait for training.

use crate::config::ForecastConfig;
use crate::data::{HolidayEntry, PreparedSeries};
use crate::engine::{
    Anomaly, Components, FeatureImportance, ForecastEngine, ModelArtifact, RegressorSchedule,
};
use crate::error::{ForecastError, Result};
use crate::metrics::EvaluationMetrics;
use crate::models::{ForecastPoint, Hyperparameters};
use crate::persistence::ModelStore;
use crate::preparation::DataPipeline;
use crate::sources::{HistoricalDataSource, HolidayCalendar};
use crate::training::{TrainingCoordinator, TrainingStatus};
use crate::tuning::HyperparameterTuner;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// Handle to a background training run
#[derive(Debug)]
pub struct TrainingHandle {
    job_id: String,
    handle: JoinHandle<()>,
}

impl TrainingHandle {
    /// Id of the job this run belongs to
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Block until the run has finished and its outcome is recorded
    pub fn wait(self) -> Result<()> {
        self.handle
            .join()
            .map_err(|panic| ForecastError::TrainingTask(panic_message(panic.as_ref())))
    }
}

/// Demand forecasting service for one model identity
pub struct ForecastService {
    config: ForecastConfig,
    history: Arc<dyn HistoricalDataSource>,
    calendar: Option<Arc<dyn HolidayCalendar>>,
    pipeline: DataPipeline,
    store: ModelStore,
    engine: Arc<ForecastEngine>,
    coordinator: Arc<TrainingCoordinator>,
    last_metrics: Arc<RwLock<Option<EvaluationMetrics>>>,
    /// Held while the stored artifact and its metrics change together
    publish: Arc<Mutex<()>>,
}

impl ForecastService {
    /// Create a service; a previously saved model is picked up on first use
    pub fn new(
        config: ForecastConfig,
        history: Arc<dyn HistoricalDataSource>,
        calendar: Option<Arc<dyn HolidayCalendar>>,
    ) -> Result<Self> {
        config.validate()?;
        let pipeline = DataPipeline::new(config.preparation.clone())?;
        let store = ModelStore::new(&config.model_dir, &config.model_name);
        let last_metrics = store.load_metrics();
        if let Some(metrics) = &last_metrics {
            info!(rmse = metrics.rmse, "Loaded metrics of saved model");
        }

        Ok(Self {
            engine: Arc::new(ForecastEngine::with_store(store.clone())),
            config,
            history,
            calendar,
            pipeline,
            store,
            coordinator: Arc::new(TrainingCoordinator::new()),
            last_metrics: Arc::new(RwLock::new(last_metrics)),
            publish: Arc::new(Mutex::new(())),
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Engine serving predictions
    pub fn engine(&self) -> &ForecastEngine {
        &self.engine
    }

    /// Start a background training run and return at once
    ///
    /// Fails with `ConcurrentTrainingConflict` while another run is active.
    pub fn train(&self, auto_tune: bool) -> Result<TrainingHandle> {
        let job_id = self.coordinator.start()?;

        let run = TrainingRun {
            config: self.config.clone(),
            history: Arc::clone(&self.history),
            calendar: self.calendar.clone(),
            pipeline: self.pipeline.clone(),
            store: self.store.clone(),
            engine: Arc::clone(&self.engine),
            coordinator: Arc::clone(&self.coordinator),
            last_metrics: Arc::clone(&self.last_metrics),
            publish: Arc::clone(&self.publish),
        };

        let spawned = thread::Builder::new()
            .name(format!("training-{}", job_id))
            .spawn(move || run.execute(auto_tune));

        match spawned {
            Ok(handle) => Ok(TrainingHandle { job_id, handle }),
            Err(e) => {
                self.coordinator.fail(&e.to_string());
                Err(e.into())
            }
        }
    }

    /// Current or last training job
    pub fn training_status(&self) -> TrainingStatus {
        self.coordinator.status()
    }

    /// Forecast the next `horizon_days`, assuming no promotions
    pub fn predict(&self, horizon_days: usize, include_history: bool) -> Result<Vec<ForecastPoint>> {
        self.engine
            .predict(horizon_days, include_history, &RegressorSchedule::new())
    }

    /// Forecast with known future regressor values
    pub fn predict_with(
        &self,
        horizon_days: usize,
        include_history: bool,
        schedule: &RegressorSchedule,
    ) -> Result<Vec<ForecastPoint>> {
        self.engine.predict(horizon_days, include_history, schedule)
    }

    /// Cross-validate the current model
    ///
    /// `Ok(None)` when the history is too short for a single fold. A fresh
    /// record replaces the stored metrics, unless training installed a newer
    /// model while the evaluation ran.
    pub fn evaluate(&self) -> Result<Option<EvaluationMetrics>> {
        let snapshot = self.engine.current()?;
        match snapshot.evaluate(&self.config.evaluation) {
            Ok(metrics) => {
                self.record_evaluation(&snapshot, &metrics);
                Ok(Some(metrics))
            }
            Err(ForecastError::EvaluationUnavailable(reason)) => {
                info!(%reason, "Evaluation unavailable");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Store `metrics` if `evaluated` is still the serving model
    fn record_evaluation(&self, evaluated: &Arc<ModelArtifact>, metrics: &EvaluationMetrics) -> bool {
        let _publish = self.publish.lock().unwrap_or_else(|e| e.into_inner());
        let still_current = self
            .engine
            .current()
            .map(|current| Arc::ptr_eq(&current, evaluated))
            .unwrap_or(false);
        if !still_current {
            warn!("Model replaced during evaluation, not storing its metrics");
            return false;
        }

        if let Err(e) = self.store.save_metrics(metrics) {
            warn!(error = %e, "Could not persist evaluation metrics");
        }
        *self.last_metrics.write().unwrap_or_else(|e| e.into_inner()) = Some(metrics.clone());
        true
    }

    /// What-if forecast for `days` with a promotion schedule
    pub fn simulate(&self, days: usize, schedule: &[f64]) -> Result<Vec<ForecastPoint>> {
        self.engine.simulate_scenario(days, schedule)
    }

    /// Trend and seasonal decomposition over the history and `days` ahead
    pub fn components(&self, days: usize) -> Result<Components> {
        self.engine.components(days)
    }

    /// Historical anomalies at the given interval multiplier
    pub fn detect_anomalies(&self, threshold: f64) -> Result<Vec<Anomaly>> {
        self.engine.detect_anomalies(threshold)
    }

    /// Regressor effects of the current model
    pub fn feature_importance(&self) -> Result<Vec<FeatureImportance>> {
        self.engine.feature_importance()
    }

    /// Most recent evaluation, from this process or the saved sidecar
    pub fn last_metrics(&self) -> Option<EvaluationMetrics> {
        self.last_metrics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Everything a background run needs, owned by its thread
struct TrainingRun {
    config: ForecastConfig,
    history: Arc<dyn HistoricalDataSource>,
    calendar: Option<Arc<dyn HolidayCalendar>>,
    pipeline: DataPipeline,
    store: ModelStore,
    engine: Arc<ForecastEngine>,
    coordinator: Arc<TrainingCoordinator>,
    last_metrics: Arc<RwLock<Option<EvaluationMetrics>>>,
    publish: Arc<Mutex<()>>,
}

impl TrainingRun {
    /// Run to completion and record the outcome; never unwinds
    fn execute(self, auto_tune: bool) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.train(auto_tune)));
        match outcome {
            Ok(Ok(metrics)) => self.coordinator.complete(metrics),
            Ok(Err(e)) => self.coordinator.fail(&e.to_string()),
            Err(panic) => self.coordinator.fail(&format!(
                "Training task panicked: {}",
                panic_message(panic.as_ref())
            )),
        }
    }

    fn train(&self, auto_tune: bool) -> Result<Option<EvaluationMetrics>> {
        self.coordinator.update_status("Loading history");
        let records = self.history.get_series(self.config.entity_key.as_deref())?;
        let holidays: Vec<HolidayEntry> = match &self.calendar {
            Some(calendar) => calendar.get_holidays()?,
            None => Vec::new(),
        };

        self.coordinator.update_status("Preparing data");
        let series = self.pipeline.prepare(&records)?;
        if series.is_empty() {
            return Err(ForecastError::InsufficientData(
                "No usable history after preparation".to_string(),
            ));
        }

        let params = if auto_tune {
            self.coordinator.update_status("Tuning hyperparameters");
            self.tuned_parameters(&series, &holidays)?
        } else {
            self.config.hyperparameters.clone()
        };

        self.coordinator.update_status("Fitting model");
        let artifact = ModelArtifact::fit(&series, &holidays, &params, &self.config.model)?;

        self.coordinator.update_status("Evaluating model");
        let metrics = match artifact.evaluate(&self.config.evaluation) {
            Ok(metrics) => Some(metrics),
            Err(ForecastError::EvaluationUnavailable(reason)) => {
                info!(%reason, "Skipping evaluation");
                None
            }
            Err(e) => return Err(e),
        };

        self.coordinator.update_status("Saving model");
        let _publish = self.publish.lock().unwrap_or_else(|e| e.into_inner());
        self.store.save(&artifact, metrics.as_ref())?;

        self.engine.install(Arc::new(artifact));
        *self.last_metrics.write().unwrap_or_else(|e| e.into_inner()) = metrics.clone();
        Ok(metrics)
    }

    fn tuned_parameters(
        &self,
        series: &PreparedSeries,
        holidays: &[HolidayEntry],
    ) -> Result<Hyperparameters> {
        let tuner = HyperparameterTuner::new(self.config.tuning.clone())?;
        match tuner.optimize(series, holidays, &self.config.hyperparameters, &self.config.model) {
            Some(best) => {
                info!(
                    score = best.score,
                    evaluated = best.evaluated,
                    skipped = best.skipped,
                    "Using tuned hyperparameters"
                );
                Ok(best.params)
            }
            None => {
                warn!("Tuning produced no candidate, using configured hyperparameters");
                Ok(self.config.hyperparameters.clone())
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
