//! Ranked fitting strategies
//!
//! Fitting walks an ordered ladder of strategies. Each strategy either fits,
//! declines because it does not apply to the series, or fails with a reason
//! that the moving-average fallback records in its method label.

use crate::data::{HolidayEntry, PreparedSeries};
use crate::error::{ForecastError, Result};
use crate::models::{
    ConstantModel, DecompositionModel, FittedModel, Hyperparameters, ModelSettings,
    SeasonalityMode,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// How the installed model produces its forecast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForecastMethod {
    /// History is all zero; forecast is zero
    ZeroDemand,
    /// Too few observations; forecast is the historical mean
    SimpleAverage,
    /// Full seasonal decomposition
    SeasonalDecomposition { mode: SeasonalityMode },
    /// Trailing moving average after the decomposition failed
    MovingAverageFallback { reason: String },
}

impl ForecastMethod {
    /// Human-readable description of the method
    pub fn label(&self) -> String {
        match self {
            ForecastMethod::ZeroDemand => "Zero Demand (Historical Data is all 0)".to_string(),
            ForecastMethod::SimpleAverage => "Simple Average (Insufficient Data)".to_string(),
            ForecastMethod::SeasonalDecomposition { mode } => {
                format!("Seasonal Decomposition ({})", mode)
            }
            ForecastMethod::MovingAverageFallback { reason } => {
                format!("Moving Average (Fallback due to model error: {})", reason)
            }
        }
    }

    /// Whether this method is a recovery from a failed fit
    pub fn is_fallback(&self) -> bool {
        matches!(self, ForecastMethod::MovingAverageFallback { .. })
    }
}

impl fmt::Display for ForecastMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Inputs shared by every strategy
#[derive(Debug, Clone, Copy)]
pub struct FitContext<'a> {
    pub series: &'a PreparedSeries,
    pub holidays: &'a [HolidayEntry],
    pub params: &'a Hyperparameters,
    pub settings: &'a ModelSettings,
}

/// Result of trying a single strategy
#[derive(Debug)]
pub enum StrategyOutcome {
    /// The strategy produced a model
    Fitted {
        model: FittedModel,
        method: ForecastMethod,
    },
    /// The strategy does not apply to this series
    NotApplicable,
    /// The strategy applied but could not fit
    Failed { reason: String },
}

/// A way of fitting a model, tried in ladder order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FittingStrategy {
    ZeroDemand,
    SimpleAverage,
    SeasonalDecomposition,
    MovingAverage,
}

impl FittingStrategy {
    /// Strategies in the order they are tried
    pub const LADDER: [FittingStrategy; 4] = [
        FittingStrategy::ZeroDemand,
        FittingStrategy::SimpleAverage,
        FittingStrategy::SeasonalDecomposition,
        FittingStrategy::MovingAverage,
    ];

    /// Try this strategy
    ///
    /// `previous_failure` is the reason the last applicable strategy failed;
    /// only the moving-average fallback uses it and it applies only when set.
    pub fn attempt(&self, ctx: &FitContext<'_>, previous_failure: Option<&str>) -> StrategyOutcome {
        let values = ctx.series.values();
        match self {
            FittingStrategy::ZeroDemand => {
                if ctx.series.is_all_zero() {
                    StrategyOutcome::Fitted {
                        model: FittedModel::Constant(ConstantModel::zero()),
                        method: ForecastMethod::ZeroDemand,
                    }
                } else {
                    StrategyOutcome::NotApplicable
                }
            }
            FittingStrategy::SimpleAverage => {
                if values.len() >= ctx.settings.min_observations {
                    return StrategyOutcome::NotApplicable;
                }
                match ConstantModel::mean_of(&values, ctx.settings.interval_width) {
                    Ok(model) => StrategyOutcome::Fitted {
                        model: FittedModel::Constant(model),
                        method: ForecastMethod::SimpleAverage,
                    },
                    Err(e) => StrategyOutcome::Failed {
                        reason: e.to_string(),
                    },
                }
            }
            FittingStrategy::SeasonalDecomposition => match fit_decomposition(ctx) {
                Ok(model) => StrategyOutcome::Fitted {
                    method: ForecastMethod::SeasonalDecomposition {
                        mode: model.mode(),
                    },
                    model: FittedModel::Decomposition(model),
                },
                Err(e) => StrategyOutcome::Failed {
                    reason: failure_reason(&e),
                },
            },
            FittingStrategy::MovingAverage => {
                let Some(reason) = previous_failure else {
                    return StrategyOutcome::NotApplicable;
                };
                match ConstantModel::moving_average(
                    &values,
                    ctx.settings.moving_average_window,
                    ctx.settings.interval_width,
                ) {
                    Ok(model) => StrategyOutcome::Fitted {
                        model: FittedModel::Constant(model),
                        method: ForecastMethod::MovingAverageFallback {
                            reason: reason.to_string(),
                        },
                    },
                    Err(e) => StrategyOutcome::Failed {
                        reason: e.to_string(),
                    },
                }
            }
        }
    }
}

/// Walk the ladder and return the first fitted model
///
/// Fails only for an empty series or when every strategy is exhausted.
pub fn fit_with_ladder(ctx: &FitContext<'_>) -> Result<(FittedModel, ForecastMethod)> {
    if ctx.series.is_empty() {
        return Err(ForecastError::InsufficientData(
            "Cannot fit an empty series".to_string(),
        ));
    }

    let mut failure: Option<String> = None;
    for strategy in FittingStrategy::LADDER {
        match strategy.attempt(ctx, failure.as_deref()) {
            StrategyOutcome::Fitted { model, method } => {
                if method.is_fallback() {
                    warn!(method = %method, "Seasonal decomposition failed, using fallback");
                } else {
                    info!(method = %method, observations = ctx.series.len(), "Model fitted");
                }
                return Ok((model, method));
            }
            StrategyOutcome::NotApplicable => {}
            StrategyOutcome::Failed { reason } => {
                warn!(?strategy, %reason, "Fitting strategy failed");
                failure = Some(reason);
            }
        }
    }

    Err(ForecastError::ConvergenceFailure(failure.unwrap_or_else(
        || "No fitting strategy applied".to_string(),
    )))
}

/// Fit the decomposition model directly, without fallbacks
pub fn fit_decomposition(ctx: &FitContext<'_>) -> Result<DecompositionModel> {
    DecompositionModel::fit(
        ctx.series.observations(),
        ctx.series.regressor_names(),
        ctx.holidays,
        ctx.params,
        ctx.settings.interval_width,
    )
}

fn failure_reason(error: &ForecastError) -> String {
    match error {
        ForecastError::ConvergenceFailure(reason) => reason.clone(),
        other => other.to_string(),
    }
}
