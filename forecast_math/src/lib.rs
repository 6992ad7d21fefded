//! # Forecast Math
//!
//! Numeric building blocks for the demand forecasting engine.
//! This crate provides the penalized least-squares solver, Fourier seasonal
//! features and the summary statistics the forecasting models are built on.

use thiserror::Error;

pub mod regression;
pub mod seasonality;
pub mod statistics;

pub use regression::RidgeRegression;
pub use seasonality::fourier_features;

/// Errors that can occur in forecasting calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error("Matrix is not positive definite at pivot {pivot}")]
    NotPositiveDefinite { pivot: usize },
}

/// Result type for forecasting math operations
pub type Result<T> = std::result::Result<T, MathError>;
