//! Forecasting models for daily demand

use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::str::FromStr;

pub mod baseline;
pub mod decomposition;
pub mod strategy;

pub use baseline::ConstantModel;
pub use decomposition::DecompositionModel;
pub use strategy::{FittingStrategy, ForecastMethod};

/// How seasonal, holiday and regressor effects combine with the trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalityMode {
    /// `trend + effects`
    Additive,
    /// `trend * (1 + effects)`
    Multiplicative,
}

impl fmt::Display for SeasonalityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeasonalityMode::Additive => write!(f, "additive"),
            SeasonalityMode::Multiplicative => write!(f, "multiplicative"),
        }
    }
}

impl FromStr for SeasonalityMode {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "additive" => Ok(SeasonalityMode::Additive),
            "multiplicative" => Ok(SeasonalityMode::Multiplicative),
            other => Err(ForecastError::InvalidParameter(format!(
                "Invalid seasonality mode: {}. Must be 'additive' or 'multiplicative'.",
                other
            ))),
        }
    }
}

/// Tunable settings of the seasonal decomposition model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    /// Prior scale of trend changepoints; larger lets the trend bend more
    pub changepoint_prior_scale: f64,
    /// Prior scale of the Fourier seasonal terms
    pub seasonality_prior_scale: f64,
    /// Prior scale of holiday effects
    pub holidays_prior_scale: f64,
    /// Additive or multiplicative effects
    pub seasonality_mode: SeasonalityMode,
    /// Weekly seasonal term (period 7)
    pub weekly_seasonality: bool,
    /// Yearly seasonal term (period 365.25)
    pub yearly_seasonality: bool,
    /// Monthly seasonal term (period 30.5)
    pub monthly_seasonality: bool,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            holidays_prior_scale: 10.0,
            seasonality_mode: SeasonalityMode::Multiplicative,
            weekly_seasonality: true,
            yearly_seasonality: true,
            monthly_seasonality: true,
        }
    }
}

impl Hyperparameters {
    /// Copy with the tunable prior scales and mode replaced
    pub fn with_search_point(
        &self,
        changepoint_prior_scale: f64,
        seasonality_prior_scale: f64,
        holidays_prior_scale: f64,
        seasonality_mode: SeasonalityMode,
    ) -> Self {
        Self {
            changepoint_prior_scale,
            seasonality_prior_scale,
            holidays_prior_scale,
            seasonality_mode,
            ..self.clone()
        }
    }

    /// Reject non-positive or non-finite prior scales
    pub fn validate(&self) -> Result<()> {
        let scales = [
            ("changepoint_prior_scale", self.changepoint_prior_scale),
            ("seasonality_prior_scale", self.seasonality_prior_scale),
            ("holidays_prior_scale", self.holidays_prior_scale),
        ];
        for (name, value) in scales {
            if !value.is_finite() || value <= 0.0 {
                return Err(ForecastError::InvalidParameter(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Model settings that are not searched by the tuner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Central coverage of the prediction interval
    pub interval_width: f64,
    /// Below this many observations the mean is forecast
    pub min_observations: usize,
    /// Trailing window of the moving-average fallback
    pub moving_average_window: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            interval_width: 0.80,
            min_observations: 7,
            moving_average_window: 7,
        }
    }
}

impl ModelSettings {
    /// Check the settings are usable
    pub fn validate(&self) -> Result<()> {
        if self.interval_width <= 0.0 || self.interval_width >= 1.0 {
            return Err(ForecastError::InvalidParameter(
                "Interval width must be between 0 and 1".to_string(),
            ));
        }
        if self.moving_average_window == 0 {
            return Err(ForecastError::InvalidParameter(
                "Moving average window must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Point forecast with its uncertainty interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    /// Expected value
    pub point: f64,
    /// Lower interval bound
    pub lower: f64,
    /// Upper interval bound
    pub upper: f64,
}

/// One forecast row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Forecast day
    pub date: NaiveDate,
    /// Expected demand
    pub point_estimate: f64,
    /// Lower bound of the uncertainty interval
    pub lower_bound: f64,
    /// Upper bound of the uncertainty interval
    pub upper_bound: f64,
    /// Observed demand, present only for historical rows
    pub actual: Option<f64>,
}

impl ForecastPoint {
    /// Build a forecast row from an estimate
    pub fn from_estimate(date: NaiveDate, estimate: Estimate, actual: Option<f64>) -> Self {
        Self {
            date,
            point_estimate: estimate.point,
            lower_bound: estimate.lower,
            upper_bound: estimate.upper,
            actual,
        }
    }
}

/// A fitted model that can score any day
pub trait TrainedModel: Debug {
    /// Estimate demand on `date` given that day's regressor values
    ///
    /// Regressors absent from the map are taken as 0.
    fn estimate(&self, date: NaiveDate, regressors: &BTreeMap<String, f64>) -> Estimate;

    /// Coefficient of a registered regressor, in the model's own mode
    fn regressor_coefficient(&self, _name: &str) -> Option<f64> {
        None
    }

    /// Named component values on `date` (trend, weekly, yearly, ...)
    fn components(&self, date: NaiveDate) -> BTreeMap<String, f64>;
}

/// Any fitted model, serializable as a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedModel {
    /// Constant forecast (zero demand, mean or moving average)
    Constant(ConstantModel),
    /// Trend, seasonality, holiday and regressor decomposition
    Decomposition(DecompositionModel),
}

impl TrainedModel for FittedModel {
    fn estimate(&self, date: NaiveDate, regressors: &BTreeMap<String, f64>) -> Estimate {
        match self {
            FittedModel::Constant(model) => model.estimate(date, regressors),
            FittedModel::Decomposition(model) => model.estimate(date, regressors),
        }
    }

    fn regressor_coefficient(&self, name: &str) -> Option<f64> {
        match self {
            FittedModel::Constant(model) => model.regressor_coefficient(name),
            FittedModel::Decomposition(model) => model.regressor_coefficient(name),
        }
    }

    fn components(&self, date: NaiveDate) -> BTreeMap<String, f64> {
        match self {
            FittedModel::Constant(model) => model.components(date),
            FittedModel::Decomposition(model) => model.components(date),
        }
    }
}
