//! Error types for the demand_forecast crate

use polars::prelude::PolarsError;
use thiserror::Error;

/// Custom error types for the demand_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// Not enough history to perform the requested operation
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Model fitting failed numerically
    #[error("Model failed to converge: {0}")]
    ConvergenceFailure(String),

    /// No fitted model is available and none could be loaded from storage
    #[error("Model has not been trained yet")]
    ModelNotTrained,

    /// A training job is already running
    #[error("Training job {job_id} is already in progress")]
    ConcurrentTrainingConflict { job_id: String },

    /// Historical span too short for a single cross-validation fold
    #[error("Evaluation unavailable: {0}")]
    EvaluationUnavailable(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Failure inside the background training task
    #[error("Training task failed: {0}")]
    TrainingTask(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from (de)serializing model state
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error from numeric kernels
    #[error("Math error: {0}")]
    MathError(#[from] forecast_math::MathError),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::SerializationError(err.to_string())
    }
}
