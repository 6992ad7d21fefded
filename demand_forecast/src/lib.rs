//! # Demand Forecast
//!
//! Per-entity demand forecasting from daily sales history.
//!
//! ## Features
//!
//! - Data preparation: deduplication, gap filling, schema unification,
//!   same-day aggregation and outlier clipping
//! - Seasonal decomposition model (piecewise-linear trend, weekly, yearly and
//!   monthly Fourier terms, holidays, exogenous regressors) with
//!   mean and moving-average fallbacks
//! - Rolling-origin cross-validation and grid-search hyperparameter tuning
//! - Scenario simulation, anomaly detection and feature importance
//! - Single-flight background training with durable model storage
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use demand_forecast::{ForecastConfig, ForecastService, SyntheticHistory};
//! use std::sync::Arc;
//!
//! # fn main() -> demand_forecast::Result<()> {
//! let history = Arc::new(SyntheticHistory::two_years(42));
//! let service = ForecastService::new(ForecastConfig::default(), history, None)?;
//!
//! // Train in the background and wait for the job to finish
//! let handle = service.train(false)?;
//! handle.wait()?;
//!
//! // Forecast the next 30 days, then try a promotion on the first 3
//! let forecast = service.predict(30, false)?;
//! let scenario = service.simulate(30, &[1.0, 1.0, 1.0])?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod models;
pub mod persistence;
pub mod preparation;
pub mod service;
pub mod sources;
pub mod synthetic;
pub mod training;
pub mod tuning;
pub mod utils;

// Re-export commonly used types
pub use crate::config::ForecastConfig;
pub use crate::data::{DataLoader, HolidayEntry, Observation, PreparedSeries, RawRecord, SalesRecord};
pub use crate::engine::{ForecastEngine, ModelArtifact, RegressorSchedule};
pub use crate::error::{ForecastError, Result};
pub use crate::metrics::{CrossValidationConfig, EvaluationMetrics};
pub use crate::models::{ForecastMethod, ForecastPoint, Hyperparameters, SeasonalityMode};
pub use crate::persistence::ModelStore;
pub use crate::preparation::{DataPipeline, PreparationConfig};
pub use crate::service::{ForecastService, TrainingHandle};
pub use crate::sources::{HistoricalDataSource, HolidayCalendar};
pub use crate::synthetic::SyntheticHistory;
pub use crate::training::{JobState, TrainingCoordinator, TrainingStatus};
pub use crate::tuning::{HyperparameterTuner, TuningConfig, TuningGrid};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
