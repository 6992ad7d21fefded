//! Seasonal decomposition model
//!
//! `y(t) = g(t) ∘ (s(t) + h(t) + x(t)β)` where `g` is a piecewise-linear
//! trend with automatically placed changepoints, `s` a sum of Fourier
//! seasonal terms, `h` holiday indicators and `x` exogenous regressors.
//! `∘` is `+` in additive mode and `g·(1 + ·)` in multiplicative mode.
//!
//! Coefficients are found by ridge regression on a scaled target, with
//! penalties derived from the prior scales in [`Hyperparameters`].

use crate::data::{HolidayEntry, Observation};
use crate::error::{ForecastError, Result};
use crate::models::{Estimate, Hyperparameters, SeasonalityMode, TrainedModel};
use chrono::NaiveDate;
use forecast_math::seasonality::{fourier_row, seasonal_value};
use forecast_math::statistics::interval_multiplier;
use forecast_math::RidgeRegression;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Maximum number of trend changepoints
const MAX_CHANGEPOINTS: usize = 25;

/// Share of the history in which changepoints may be placed
const CHANGEPOINT_RANGE: f64 = 0.8;

/// Assumed observation noise on the scaled target
const NOISE_SCALE: f64 = 0.1;

/// Prior scale of exogenous regressors
const REGRESSOR_PRIOR_SCALE: f64 = 10.0;

/// Fourier order of the weekly term
pub const WEEKLY_ORDER: usize = 3;
/// Fourier order of the yearly term
pub const YEARLY_ORDER: usize = 10;
/// Fourier order of the monthly term
pub const MONTHLY_ORDER: usize = 5;

/// A fitted Fourier seasonal term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalTerm {
    /// Component name (weekly, yearly, monthly)
    pub name: String,
    /// Period in days
    pub period: f64,
    /// Fourier coefficients laid out as `[sin1, cos1, sin2, cos2, ...]`
    pub coefficients: Vec<f64>,
}

impl SeasonalTerm {
    fn order(&self) -> usize {
        self.coefficients.len() / 2
    }

    fn value(&self, date: NaiveDate) -> f64 {
        seasonal_value(epoch_days(date), self.period, &self.coefficients)
    }
}

/// A fitted holiday effect shared by every entry with the same label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolidayTerm {
    /// Holiday label
    pub label: String,
    /// Sorted days on which the effect applies
    pub days: Vec<NaiveDate>,
    /// Fitted effect
    pub coefficient: f64,
}

impl HolidayTerm {
    fn indicator(&self, date: NaiveDate) -> f64 {
        if self.days.binary_search(&date).is_ok() {
            1.0
        } else {
            0.0
        }
    }
}

/// A fitted exogenous regressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressorTerm {
    /// Regressor column name
    pub name: String,
    /// Fitted coefficient on the scaled target
    pub coefficient: f64,
}

/// Fitted seasonal decomposition model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionModel {
    mode: SeasonalityMode,
    /// First training day, `t = 0`
    start: NaiveDate,
    /// Days between first and last training day, `t = 1` at the end
    span_days: f64,
    /// Target scale, the maximum absolute training value
    y_scale: f64,
    /// Trend offset
    offset: f64,
    /// Base trend slope
    slope: f64,
    /// Changepoint locations on the scaled time axis
    changepoints: Vec<f64>,
    /// Slope change at each changepoint
    deltas: Vec<f64>,
    seasonal: Vec<SeasonalTerm>,
    holidays: Vec<HolidayTerm>,
    regressors: Vec<RegressorTerm>,
    /// Residual standard deviation on the scaled target
    sigma: f64,
    /// Interval multiplier
    z: f64,
}

/// Layout of the design matrix columns
struct Design {
    changepoints: Vec<f64>,
    seasonal: Vec<(String, f64, usize)>,
    holidays: Vec<(String, Vec<NaiveDate>)>,
    regressors: Vec<String>,
}

impl Design {
    /// Number of effect columns (everything except trend)
    fn effect_columns(&self) -> usize {
        self.seasonal.iter().map(|(_, _, order)| 2 * order).sum::<usize>()
            + self.holidays.len()
            + self.regressors.len()
    }

    fn trend_columns(&self) -> usize {
        2 + self.changepoints.len()
    }

    fn trend_row(&self, t: f64) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.trend_columns());
        row.push(1.0);
        row.push(t);
        row.extend(self.changepoints.iter().map(|&s| (t - s).max(0.0)));
        row
    }

    fn effect_row(&self, observation: &Observation) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.effect_columns());
        let t_days = epoch_days(observation.date);
        for (_, period, order) in &self.seasonal {
            row.extend(fourier_row(t_days, *period, *order));
        }
        for (_, days) in &self.holidays {
            row.push(if days.binary_search(&observation.date).is_ok() {
                1.0
            } else {
                0.0
            });
        }
        for name in &self.regressors {
            row.push(observation.regressor(name));
        }
        row
    }

    fn trend_penalties(&self, params: &Hyperparameters) -> Vec<f64> {
        let mut penalties = vec![0.0, 0.0];
        penalties.extend(
            std::iter::repeat(prior_penalty(params.changepoint_prior_scale))
                .take(self.changepoints.len()),
        );
        penalties
    }

    fn effect_penalties(&self, params: &Hyperparameters) -> Vec<f64> {
        let mut penalties = Vec::with_capacity(self.effect_columns());
        for (_, _, order) in &self.seasonal {
            penalties.extend(
                std::iter::repeat(prior_penalty(params.seasonality_prior_scale)).take(2 * order),
            );
        }
        penalties.extend(
            std::iter::repeat(prior_penalty(params.holidays_prior_scale)).take(self.holidays.len()),
        );
        penalties.extend(
            std::iter::repeat(prior_penalty(REGRESSOR_PRIOR_SCALE)).take(self.regressors.len()),
        );
        penalties
    }
}

impl DecompositionModel {
    /// Fit the model to a daily series
    ///
    /// Fails with `ConvergenceFailure` when the series cannot support the
    /// model (constant zero, a single day) or the solve breaks down.
    pub fn fit(
        observations: &[Observation],
        regressor_names: &[String],
        holidays: &[HolidayEntry],
        params: &Hyperparameters,
        interval_width: f64,
    ) -> Result<Self> {
        params.validate()?;

        let (first, last) = match (observations.first(), observations.last()) {
            (Some(first), Some(last)) if observations.len() >= 2 => (first.date, last.date),
            _ => {
                return Err(ForecastError::ConvergenceFailure(
                    "Need at least two observations".to_string(),
                ))
            }
        };
        let span_days = (last - first).num_days() as f64;
        if span_days <= 0.0 {
            return Err(ForecastError::ConvergenceFailure(
                "History spans a single day".to_string(),
            ));
        }

        let y_scale = observations
            .iter()
            .map(|o| o.value.abs())
            .fold(0.0, f64::max);
        if y_scale <= 0.0 || !y_scale.is_finite() {
            return Err(ForecastError::ConvergenceFailure(
                "Target has no scale".to_string(),
            ));
        }

        let t: Vec<f64> = observations
            .iter()
            .map(|o| (o.date - first).num_days() as f64 / span_days)
            .collect();
        let y: Vec<f64> = observations.iter().map(|o| o.value / y_scale).collect();

        let design = Design {
            changepoints: place_changepoints(&t),
            seasonal: seasonal_layout(params),
            holidays: holiday_layout(holidays, first, last),
            regressors: regressor_names.to_vec(),
        };

        let trend_rows: Vec<Vec<f64>> = t.iter().map(|&ti| design.trend_row(ti)).collect();
        let effect_rows: Vec<Vec<f64>> =
            observations.iter().map(|o| design.effect_row(o)).collect();

        let mut penalties = design.trend_penalties(params);
        penalties.extend(design.effect_penalties(params));

        let full_rows: Vec<Vec<f64>> = trend_rows
            .iter()
            .zip(&effect_rows)
            .map(|(trend, effect)| trend.iter().chain(effect).copied().collect())
            .collect();
        let beta = solve(penalties, &full_rows, &y)?;
        let (trend_beta, additive_effects) = beta.split_at(design.trend_columns());

        let trend_fit: Vec<f64> = trend_rows.iter().map(|row| dot(row, trend_beta)).collect();

        let effects = match params.seasonality_mode {
            SeasonalityMode::Additive => additive_effects.to_vec(),
            SeasonalityMode::Multiplicative if design.effect_columns() > 0 => {
                let scaled_rows: Vec<Vec<f64>> = effect_rows
                    .iter()
                    .zip(&trend_fit)
                    .map(|(row, g)| row.iter().map(|x| x * g).collect())
                    .collect();
                let residual: Vec<f64> = y.iter().zip(&trend_fit).map(|(yi, g)| yi - g).collect();
                solve(design.effect_penalties(params), &scaled_rows, &residual)?
            }
            SeasonalityMode::Multiplicative => Vec::new(),
        };

        let fitted: Vec<f64> = trend_fit
            .iter()
            .zip(&effect_rows)
            .map(|(g, row)| {
                let effect = dot(row, &effects);
                match params.seasonality_mode {
                    SeasonalityMode::Additive => g + effect,
                    SeasonalityMode::Multiplicative => g * (1.0 + effect),
                }
            })
            .collect();
        let sigma = (y
            .iter()
            .zip(&fitted)
            .map(|(yi, fi)| (yi - fi).powi(2))
            .sum::<f64>()
            / y.len() as f64)
            .sqrt();

        if !sigma.is_finite() {
            return Err(ForecastError::ConvergenceFailure(
                "Residual variance is not finite".to_string(),
            ));
        }

        let model = Self::assemble(
            design,
            params.seasonality_mode,
            first,
            span_days,
            y_scale,
            trend_beta,
            &effects,
            sigma,
            interval_multiplier(interval_width)?,
        );
        debug!(
            mode = %model.mode,
            changepoints = model.changepoints.len(),
            holidays = model.holidays.len(),
            regressors = model.regressors.len(),
            sigma = model.sigma,
            "Fitted seasonal decomposition"
        );
        Ok(model)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        design: Design,
        mode: SeasonalityMode,
        start: NaiveDate,
        span_days: f64,
        y_scale: f64,
        trend_beta: &[f64],
        effects: &[f64],
        sigma: f64,
        z: f64,
    ) -> Self {
        let mut cursor = effects.iter().copied();

        let seasonal = design
            .seasonal
            .into_iter()
            .map(|(name, period, order)| SeasonalTerm {
                name,
                period,
                coefficients: cursor.by_ref().take(2 * order).collect(),
            })
            .collect();
        let holidays = design
            .holidays
            .into_iter()
            .map(|(label, days)| HolidayTerm {
                label,
                days,
                coefficient: cursor.next().unwrap_or(0.0),
            })
            .collect();
        let regressors = design
            .regressors
            .into_iter()
            .map(|name| RegressorTerm {
                name,
                coefficient: cursor.next().unwrap_or(0.0),
            })
            .collect();

        Self {
            mode,
            start,
            span_days,
            y_scale,
            offset: trend_beta[0],
            slope: trend_beta[1],
            changepoints: design.changepoints,
            deltas: trend_beta[2..].to_vec(),
            seasonal,
            holidays,
            regressors,
            sigma,
            z,
        }
    }

    /// Seasonality mode the model was fitted in
    pub fn mode(&self) -> SeasonalityMode {
        self.mode
    }

    /// Fitted seasonal terms
    pub fn seasonal_terms(&self) -> &[SeasonalTerm] {
        &self.seasonal
    }

    /// Fitted holiday effects
    pub fn holiday_terms(&self) -> &[HolidayTerm] {
        &self.holidays
    }

    fn scaled_time(&self, date: NaiveDate) -> f64 {
        (date - self.start).num_days() as f64 / self.span_days
    }

    /// Trend on the scaled target
    fn trend(&self, t: f64) -> f64 {
        self.offset
            + self.slope * t
            + self
                .changepoints
                .iter()
                .zip(&self.deltas)
                .map(|(s, delta)| delta * (t - s).max(0.0))
                .sum::<f64>()
    }

    /// Sum of seasonal, holiday and regressor effects on the scaled target
    fn effects(&self, date: NaiveDate, regressors: &BTreeMap<String, f64>) -> f64 {
        let seasonal: f64 = self.seasonal.iter().map(|term| term.value(date)).sum();
        let holidays: f64 = self
            .holidays
            .iter()
            .map(|term| term.coefficient * term.indicator(date))
            .sum();
        let exogenous: f64 = self
            .regressors
            .iter()
            .map(|term| term.coefficient * regressors.get(&term.name).copied().unwrap_or(0.0))
            .sum();
        seasonal + holidays + exogenous
    }

    /// Standard deviation of future trend drift, on the scaled target
    ///
    /// Future changepoints are assumed to arrive at the historical rate with
    /// Laplace-distributed slope changes of the historical mean magnitude.
    fn trend_uncertainty(&self, t: f64) -> f64 {
        let horizon = (t - 1.0).max(0.0);
        if horizon == 0.0 || self.deltas.is_empty() {
            return 0.0;
        }
        let rate = self.changepoints.len() as f64;
        let magnitude =
            self.deltas.iter().map(|d| d.abs()).sum::<f64>() / self.deltas.len() as f64;
        magnitude * (2.0 * rate * horizon.powi(3) / 3.0).sqrt()
    }
}

impl TrainedModel for DecompositionModel {
    fn estimate(&self, date: NaiveDate, regressors: &BTreeMap<String, f64>) -> Estimate {
        let t = self.scaled_time(date);
        let trend = self.trend(t);
        let effects = self.effects(date, regressors);

        let scaled = match self.mode {
            SeasonalityMode::Additive => trend + effects,
            SeasonalityMode::Multiplicative => trend * (1.0 + effects),
        };
        let spread = (self.sigma.powi(2) + self.trend_uncertainty(t).powi(2)).sqrt();
        let point = scaled * self.y_scale;
        let margin = self.z * spread * self.y_scale;

        Estimate {
            point,
            lower: point - margin,
            upper: point + margin,
        }
    }

    /// Additive coefficients are in demand units, multiplicative ones are
    /// relative to the trend
    fn regressor_coefficient(&self, name: &str) -> Option<f64> {
        self.regressors
            .iter()
            .find(|term| term.name == name)
            .map(|term| match self.mode {
                SeasonalityMode::Additive => term.coefficient * self.y_scale,
                SeasonalityMode::Multiplicative => term.coefficient,
            })
    }

    /// Trend in demand units; seasonal terms in demand units (additive) or
    /// as a fraction of the trend (multiplicative)
    fn components(&self, date: NaiveDate) -> BTreeMap<String, f64> {
        let mut components = BTreeMap::new();
        components.insert(
            "trend".to_string(),
            self.trend(self.scaled_time(date)) * self.y_scale,
        );
        for term in &self.seasonal {
            let value = match self.mode {
                SeasonalityMode::Additive => term.value(date) * self.y_scale,
                SeasonalityMode::Multiplicative => term.value(date),
            };
            components.insert(term.name.clone(), value);
        }
        components
    }
}

/// Days since the Unix epoch, the phase origin of every seasonal term
fn epoch_days(date: NaiveDate) -> f64 {
    date.signed_duration_since(NaiveDate::default()).num_days() as f64
}

/// Ridge penalty for a Gaussian prior of the given scale
fn prior_penalty(scale: f64) -> f64 {
    (NOISE_SCALE / scale).powi(2)
}

fn dot(row: &[f64], beta: &[f64]) -> f64 {
    row.iter().zip(beta).map(|(x, b)| x * b).sum()
}

fn solve(penalties: Vec<f64>, rows: &[Vec<f64>], targets: &[f64]) -> Result<Vec<f64>> {
    let beta = RidgeRegression::new(penalties)
        .and_then(|solver| solver.fit(rows, targets))
        .map_err(|e| ForecastError::ConvergenceFailure(e.to_string()))?;

    if beta.iter().any(|b| !b.is_finite()) {
        return Err(ForecastError::ConvergenceFailure(
            "Non-finite coefficient".to_string(),
        ));
    }
    Ok(beta)
}

/// Evenly spaced changepoints over the first 80% of the rows
fn place_changepoints(t: &[f64]) -> Vec<f64> {
    let history = (t.len() as f64 * CHANGEPOINT_RANGE).floor() as usize;
    let count = MAX_CHANGEPOINTS.min(history.saturating_sub(1));
    if count == 0 {
        return Vec::new();
    }

    let step = (history - 1) as f64 / count as f64;
    let mut points: Vec<f64> = (1..=count)
        .map(|i| t[(i as f64 * step).round() as usize])
        .collect();
    points.dedup();
    points
}

fn seasonal_layout(params: &Hyperparameters) -> Vec<(String, f64, usize)> {
    let mut layout = Vec::new();
    if params.weekly_seasonality {
        layout.push(("weekly".to_string(), 7.0, WEEKLY_ORDER));
    }
    if params.yearly_seasonality {
        layout.push(("yearly".to_string(), 365.25, YEARLY_ORDER));
    }
    if params.monthly_seasonality {
        layout.push(("monthly".to_string(), 30.5, MONTHLY_ORDER));
    }
    layout
}

/// One indicator per label with at least one active day inside the history
fn holiday_layout(
    holidays: &[HolidayEntry],
    first: NaiveDate,
    last: NaiveDate,
) -> Vec<(String, Vec<NaiveDate>)> {
    let mut by_label: BTreeMap<&str, BTreeSet<NaiveDate>> = BTreeMap::new();
    for entry in holidays {
        by_label
            .entry(entry.label.as_str())
            .or_default()
            .extend(entry.active_days());
    }

    by_label
        .into_iter()
        .filter(|(_, days)| days.range(first..=last).next().is_some())
        .map(|(label, days)| (label.to_string(), days.into_iter().collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::Duration;

    fn weekly_series(days: i64) -> Vec<Observation> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        (0..days)
            .map(|i| {
                let date = start + Duration::days(i);
                let weekend = if i % 7 >= 5 { 40.0 } else { 0.0 };
                Observation::new(date, 100.0 + 0.1 * i as f64 + weekend)
            })
            .collect()
    }

    fn additive() -> Hyperparameters {
        Hyperparameters {
            seasonality_mode: SeasonalityMode::Additive,
            yearly_seasonality: false,
            monthly_seasonality: false,
            ..Hyperparameters::default()
        }
    }

    #[test]
    fn changepoints_stay_in_first_eighty_percent() {
        let t: Vec<f64> = (0..100).map(|i| i as f64 / 99.0).collect();
        let points = place_changepoints(&t);
        assert_eq!(points.len(), MAX_CHANGEPOINTS);
        assert!(points.iter().all(|&s| s > 0.0 && s <= 0.8));
    }

    #[test]
    fn learns_weekly_pattern() {
        let series = weekly_series(120);
        let model = DecompositionModel::fit(&series, &[], &[], &additive(), 0.8).unwrap();

        let saturday = NaiveDate::from_ymd_opt(2023, 5, 6).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2023, 5, 2).unwrap();
        let gap = model.estimate(saturday, &BTreeMap::new()).point
            - model.estimate(tuesday, &BTreeMap::new()).point;
        assert!((gap - 40.0).abs() < 5.0, "weekend uplift was {}", gap);
    }

    #[test]
    fn promotion_coefficient_is_positive() {
        let series: Vec<Observation> = weekly_series(90)
            .into_iter()
            .enumerate()
            .map(|(i, o)| {
                let promo = if i % 5 == 0 { 1.0 } else { 0.0 };
                Observation::new(o.date, o.value + 30.0 * promo).with_regressor("onpromotion", promo)
            })
            .collect();
        let names = vec!["onpromotion".to_string()];
        let model = DecompositionModel::fit(&series, &names, &[], &additive(), 0.8).unwrap();

        let coefficient = model.regressor_coefficient("onpromotion").unwrap();
        assert!((coefficient - 30.0).abs() < 3.0, "coefficient was {}", coefficient);
    }

    #[test]
    fn interval_widens_beyond_history() {
        let series = weekly_series(120);
        let model = DecompositionModel::fit(&series, &[], &[], &additive(), 0.8).unwrap();
        let last = series.last().unwrap().date;

        let near = model.estimate(last + Duration::days(1), &BTreeMap::new());
        let far = model.estimate(last + Duration::days(90), &BTreeMap::new());
        assert!(far.upper - far.lower >= near.upper - near.lower);
        assert_abs_diff_eq!(
            near.point - near.lower,
            near.upper - near.point,
            epsilon = 1e-9
        );
    }

    #[test]
    fn rejects_all_zero_target() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let series: Vec<Observation> = (0..10)
            .map(|i| Observation::new(start + Duration::days(i), 0.0))
            .collect();
        let result = DecompositionModel::fit(&series, &[], &[], &additive(), 0.8);
        assert!(matches!(result, Err(ForecastError::ConvergenceFailure(_))));
    }
}
