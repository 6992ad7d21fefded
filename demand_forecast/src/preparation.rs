//! Data preparation pipeline
//!
//! Turns raw historical rows into a single daily series plus regressor columns:
//!
//! 1. drop exact duplicate rows
//! 2. forward-fill null scalar cells, then default the remaining nulls to zero
//! 3. map alternate column names onto the canonical date/value pair
//! 4. aggregate rows sharing a date (values summed, binary regressors OR-ed)
//! 5. clip values into an empirical percentile range
//!
//! A missing date or value column yields an empty series rather than an error.

use crate::data::{Observation, PreparedSeries, RawRecord, RawValue};
use crate::error::{ForecastError, Result};
use crate::utils::date_range;
use chrono::NaiveDate;
use forecast_math::statistics::clip_to_quantiles;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info, warn};

/// Column names accepted for the date of a row
pub const TIMESTAMP_ALIASES: &[&str] = &["ds", "date", "timestamp", "datetime", "day"];

/// Column names accepted for the observed quantity
pub const VALUE_ALIASES: &[&str] = &[
    "y",
    "quantity",
    "value",
    "sales",
    "qty",
    "units",
    "units_sold",
    "demand",
];

/// Alternate spellings of the promotion flag
pub const PROMOTION_ALIASES: &[&str] = &[
    "onpromotion",
    "on_promotion",
    "promotion",
    "promotion_flag",
    "promo",
    "is_promo",
];

/// Canonical name of the promotion regressor
pub const PROMOTION_REGRESSOR: &str = "onpromotion";

/// Preparation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreparationConfig {
    /// Lower and upper quantile used for outlier clipping; `None` disables it
    pub outlier_quantiles: Option<(f64, f64)>,
    /// Value written for days missing between the first and last date; `None` leaves gaps
    pub fill_missing_days: Option<f64>,
    /// Regressor columns to carry into the series
    pub regressors: Vec<String>,
}

impl Default for PreparationConfig {
    fn default() -> Self {
        Self {
            outlier_quantiles: Some((0.01, 0.99)),
            fill_missing_days: None,
            regressors: vec![PROMOTION_REGRESSOR.to_string()],
        }
    }
}

impl PreparationConfig {
    /// Check the settings are usable
    pub fn validate(&self) -> Result<()> {
        if let Some((low, high)) = self.outlier_quantiles {
            if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) || low > high {
                return Err(ForecastError::InvalidParameter(format!(
                    "Outlier quantiles must satisfy 0 <= low <= high <= 1, got ({}, {})",
                    low, high
                )));
            }
        }
        if let Some(fill) = self.fill_missing_days {
            if !fill.is_finite() || fill < 0.0 {
                return Err(ForecastError::InvalidParameter(
                    "Missing-day fill value must be finite and non-negative".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Cleans and reshapes raw rows into a prepared daily series
#[derive(Debug, Clone, Default)]
pub struct DataPipeline {
    config: PreparationConfig,
}

/// A row after schema unification
struct CanonicalRow {
    date: NaiveDate,
    value: f64,
    regressors: BTreeMap<String, f64>,
}

impl DataPipeline {
    /// Create a pipeline with the given settings
    pub fn new(config: PreparationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Settings in use
    pub fn config(&self) -> &PreparationConfig {
        &self.config
    }

    /// Run every preparation step
    pub fn prepare(&self, records: &[RawRecord]) -> Result<PreparedSeries> {
        let mut unique = Self::drop_duplicates(records)?;
        Self::sort_by_date(&mut unique);
        let filled = Self::fill_missing(unique);

        let (rows, regressor_names) = match self.unify_schema(&filled) {
            Some(unified) => unified,
            None => {
                warn!(
                    records = records.len(),
                    "history lacks a date or quantity column; returning empty series"
                );
                return Ok(PreparedSeries::empty());
            }
        };

        let mut observations = Self::aggregate(rows, &regressor_names);

        if let Some((low, high)) = self.config.outlier_quantiles {
            Self::cap_outliers(&mut observations, low, high)?;
        }
        if let Some(fill) = self.config.fill_missing_days {
            observations = Self::fill_calendar_gaps(observations, &regressor_names, fill);
        }

        info!(
            raw = records.len(),
            days = observations.len(),
            regressors = ?regressor_names,
            "prepared daily series"
        );

        Ok(PreparedSeries::new(observations, regressor_names))
    }

    /// Keep the first occurrence of every exact duplicate
    fn drop_duplicates(records: &[RawRecord]) -> Result<Vec<RawRecord>> {
        let mut seen = HashSet::with_capacity(records.len());
        let mut unique = Vec::with_capacity(records.len());
        for record in records {
            if seen.insert(record.identity_key()?) {
                unique.push(record.clone());
            }
        }
        if unique.len() < records.len() {
            debug!(dropped = records.len() - unique.len(), "dropped duplicate rows");
        }
        Ok(unique)
    }

    /// Stable sort into date order so filling follows time, not arrival
    ///
    /// Rows without a readable date go last; schema unification drops them.
    fn sort_by_date(records: &mut [RawRecord]) {
        records.sort_by_key(|record| {
            let date = lookup(record, TIMESTAMP_ALIASES).and_then(RawValue::as_date);
            (date.is_none(), date)
        });
    }

    /// Forward-fill null cells column by column, then zero what is left
    ///
    /// Date columns are never filled: a row without a date cannot be placed.
    fn fill_missing(mut records: Vec<RawRecord>) -> Vec<RawRecord> {
        let columns: BTreeSet<String> = records
            .iter()
            .flat_map(|r| r.columns().map(str::to_string))
            .filter(|c| !TIMESTAMP_ALIASES.contains(&normalize(c).as_str()))
            .collect();

        for column in &columns {
            let mut last: Option<RawValue> = None;
            for record in records.iter_mut() {
                if let Some(cell) = record.get_mut(column) {
                    if cell.is_missing() {
                        *cell = last.clone().unwrap_or(RawValue::Number(0.0));
                    } else {
                        last = Some(cell.clone());
                    }
                }
            }
        }

        records
    }

    /// Map alternate column names onto date, value and regressors
    ///
    /// Returns `None` when no row carries a date column or none carries a
    /// value column.
    fn unify_schema(&self, records: &[RawRecord]) -> Option<(Vec<CanonicalRow>, Vec<String>)> {
        let has_column = |aliases: &[&str]| {
            records
                .iter()
                .any(|r| r.columns().any(|c| aliases.contains(&normalize(c).as_str())))
        };
        if !has_column(TIMESTAMP_ALIASES) || !has_column(VALUE_ALIASES) {
            return None;
        }

        let regressor_aliases: Vec<(String, Vec<String>)> = self
            .config
            .regressors
            .iter()
            .map(|name| (name.clone(), regressor_aliases(name)))
            .collect();

        let mut present: BTreeSet<String> = BTreeSet::new();
        let mut rows = Vec::with_capacity(records.len());
        let mut undated = 0usize;
        let mut clamped = 0usize;

        for record in records {
            let date = lookup(record, TIMESTAMP_ALIASES).and_then(RawValue::as_date);
            let value = lookup(record, VALUE_ALIASES).and_then(RawValue::as_number);

            let date = match date {
                Some(date) => date,
                None => {
                    undated += 1;
                    continue;
                }
            };

            let mut value = value.unwrap_or(0.0);
            if value < 0.0 {
                clamped += 1;
                value = 0.0;
            }

            let mut regressors = BTreeMap::new();
            for (name, aliases) in &regressor_aliases {
                let aliases: Vec<&str> = aliases.iter().map(String::as_str).collect();
                if let Some(cell) = lookup(record, &aliases) {
                    present.insert(name.clone());
                    regressors.insert(name.clone(), cell.as_number().unwrap_or(0.0));
                }
            }

            rows.push(CanonicalRow {
                date,
                value,
                regressors,
            });
        }

        if undated > 0 {
            debug!(dropped = undated, "dropped rows without a usable date");
        }
        if clamped > 0 {
            warn!(rows = clamped, "negative quantities clamped to zero");
        }

        // Keep configured order for the registered regressors
        let names = self
            .config
            .regressors
            .iter()
            .filter(|n| present.contains(*n))
            .cloned()
            .collect();

        Some((rows, names))
    }

    /// One observation per date: values summed, binary regressors OR-ed, others summed
    fn aggregate(rows: Vec<CanonicalRow>, regressor_names: &[String]) -> Vec<Observation> {
        let binary: HashSet<&String> = regressor_names
            .iter()
            .filter(|name| {
                rows.iter()
                    .filter_map(|r| r.regressors.get(*name))
                    .all(|v| *v == 0.0 || *v == 1.0)
            })
            .collect();

        let mut by_date: BTreeMap<NaiveDate, Observation> = BTreeMap::new();
        for row in rows {
            let entry = by_date
                .entry(row.date)
                .or_insert_with(|| Observation::new(row.date, 0.0));
            entry.value += row.value;
            for (name, value) in row.regressors {
                let slot = entry.regressors.entry(name.clone()).or_insert(0.0);
                if binary.contains(&name) {
                    *slot = slot.max(value);
                } else {
                    *slot += value;
                }
            }
        }

        by_date.into_values().collect()
    }

    /// Clip values into the configured empirical quantile range
    fn cap_outliers(observations: &mut [Observation], low: f64, high: f64) -> Result<()> {
        if observations.len() < 2 {
            return Ok(());
        }
        let mut values: Vec<f64> = observations.iter().map(|o| o.value).collect();
        let (floor, ceiling, clipped) = clip_to_quantiles(&mut values, low, high)?;
        for (observation, value) in observations.iter_mut().zip(values) {
            observation.value = value;
        }
        if clipped > 0 {
            debug!(clipped, floor, ceiling, "capped outlying values");
        }
        Ok(())
    }

    /// Insert a filler observation for each day missing from the range
    fn fill_calendar_gaps(
        observations: Vec<Observation>,
        regressor_names: &[String],
        fill: f64,
    ) -> Vec<Observation> {
        let (first, last) = match (observations.first(), observations.last()) {
            (Some(first), Some(last)) => (first.date, last.date),
            _ => return observations,
        };

        let mut existing: BTreeMap<NaiveDate, Observation> =
            observations.into_iter().map(|o| (o.date, o)).collect();
        let mut filled = Vec::with_capacity(existing.len());
        let mut inserted = 0usize;

        for date in date_range(first, last) {
            match existing.remove(&date) {
                Some(observation) => filled.push(observation),
                None => {
                    let mut observation = Observation::new(date, fill);
                    for name in regressor_names {
                        observation.regressors.insert(name.clone(), 0.0);
                    }
                    filled.push(observation);
                    inserted += 1;
                }
            }
        }

        if inserted > 0 {
            debug!(inserted, fill, "filled missing calendar days");
        }
        filled
    }
}

fn normalize(column: &str) -> String {
    column.trim().to_lowercase()
}

/// First non-missing cell among the aliases, in alias priority order
fn lookup<'a>(record: &'a RawRecord, aliases: &[&str]) -> Option<&'a RawValue> {
    aliases.iter().find_map(|alias| {
        record
            .columns()
            .find(|c| normalize(c) == *alias)
            .and_then(|c| record.get(c))
            .filter(|v| !v.is_missing())
    })
}

fn regressor_aliases(name: &str) -> Vec<String> {
    let name = normalize(name);
    if PROMOTION_ALIASES.contains(&name.as_str()) {
        PROMOTION_ALIASES.iter().map(|a| a.to_string()).collect()
    } else {
        vec![name]
    }
}
