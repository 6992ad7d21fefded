//! Historical demand records and the prepared daily series

use crate::error::Result;
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// A single cell of a raw, schema-agnostic record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// Calendar date
    Date(NaiveDate),
    /// Numeric value
    Number(f64),
    /// Free text, parsed later by the preparation pipeline
    Text(String),
    /// Explicit null
    Missing,
}

impl RawValue {
    /// Whether the cell holds no usable value
    pub fn is_missing(&self) -> bool {
        match self {
            RawValue::Missing => true,
            RawValue::Number(v) => v.is_nan(),
            RawValue::Text(s) => s.trim().is_empty(),
            RawValue::Date(_) => false,
        }
    }

    /// Interpret the cell as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Number(v) if v.is_finite() => Some(*v),
            RawValue::Text(s) => {
                let s = s.trim();
                match s.to_lowercase().as_str() {
                    "true" | "yes" => Some(1.0),
                    "false" | "no" => Some(0.0),
                    _ => s.parse::<f64>().ok().filter(|v| v.is_finite()),
                }
            }
            _ => None,
        }
    }

    /// Interpret the cell as a calendar date
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            RawValue::Date(d) => Some(*d),
            RawValue::Text(s) => parse_date(s),
            _ => None,
        }
    }
}

/// Parse the date formats found in sales exports
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt.date());
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    text.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// One row of historical data with arbitrary column names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    fields: BTreeMap<String, RawValue>,
}

impl RawRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, column: &str, value: RawValue) -> Self {
        self.insert(column, value);
        self
    }

    /// Insert or replace a cell
    pub fn insert(&mut self, column: &str, value: RawValue) {
        self.fields.insert(column.to_string(), value);
    }

    /// Look up a cell by exact column name
    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.fields.get(column)
    }

    /// Mutable access to a cell
    pub fn get_mut(&mut self, column: &str) -> Option<&mut RawValue> {
        self.fields.get_mut(column)
    }

    /// Column names present in this record
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    /// Canonical identity used to detect exact duplicates
    pub fn identity_key(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.fields)?)
    }
}

/// Typed sales row as served by the historical data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    /// Day of the sale
    pub date: NaiveDate,
    /// Units sold
    pub quantity: f64,
    /// Promotion flag (0/1) if known
    pub promotion: Option<f64>,
}

impl SalesRecord {
    /// Create a sales record
    pub fn new(date: NaiveDate, quantity: f64, promotion: Option<f64>) -> Self {
        Self {
            date,
            quantity,
            promotion,
        }
    }
}

impl From<&SalesRecord> for RawRecord {
    fn from(record: &SalesRecord) -> Self {
        let promotion = match record.promotion {
            Some(flag) => RawValue::Number(flag),
            None => RawValue::Missing,
        };
        RawRecord::new()
            .with("date", RawValue::Date(record.date))
            .with("quantity", RawValue::Number(record.quantity))
            .with("onpromotion", promotion)
    }
}

/// Holiday or named event from the calendar source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayEntry {
    /// Date of the event
    pub date: NaiveDate,
    /// Human-readable label; entries sharing a label share one effect
    pub label: String,
    /// Locale the event applies to (national, regional, local)
    pub locale_scope: String,
    /// Whether the holiday was moved to another day
    pub transferred: bool,
}

impl HolidayEntry {
    /// Create a national, non-transferred holiday
    pub fn new(date: NaiveDate, label: &str) -> Self {
        Self {
            date,
            label: label.to_string(),
            locale_scope: "National".to_string(),
            transferred: false,
        }
    }

    /// Mark the holiday as transferred
    pub fn transferred(mut self) -> Self {
        self.transferred = true;
        self
    }

    /// Days on which this holiday is active
    ///
    /// Transferred holidays also affect the following day.
    pub fn active_days(&self) -> Vec<NaiveDate> {
        let mut days = vec![self.date];
        if self.transferred {
            if let Some(next) = self.date.succ_opt() {
                days.push(next);
            }
        }
        days
    }
}

/// A single aggregated daily observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Day of the observation
    pub date: NaiveDate,
    /// Observed demand, non-negative and finite
    pub value: f64,
    /// Exogenous regressor values for this day
    pub regressors: BTreeMap<String, f64>,
}

impl Observation {
    /// Create an observation without regressors
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self {
            date,
            value,
            regressors: BTreeMap::new(),
        }
    }

    /// Attach a regressor value
    pub fn with_regressor(mut self, name: &str, value: f64) -> Self {
        self.regressors.insert(name.to_string(), value);
        self
    }

    /// Regressor value, 0 when not recorded
    pub fn regressor(&self, name: &str) -> f64 {
        self.regressors.get(name).copied().unwrap_or(0.0)
    }
}

/// Daily series ordered by date with at most one observation per day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreparedSeries {
    observations: Vec<Observation>,
    regressor_names: Vec<String>,
}

impl PreparedSeries {
    /// Build a series, sorting by date
    ///
    /// Later observations for an already seen date are ignored.
    pub fn new(mut observations: Vec<Observation>, regressor_names: Vec<String>) -> Self {
        observations.sort_by_key(|o| o.date);
        observations.dedup_by_key(|o| o.date);
        Self {
            observations,
            regressor_names,
        }
    }

    /// The explicit "insufficient data" series
    pub fn empty() -> Self {
        Self::default()
    }

    /// Observations in date order
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Regressor columns carried by this series
    pub fn regressor_names(&self) -> &[String] {
        &self.regressor_names
    }

    /// Check if the series is empty
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Number of observations
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Observed values in date order
    pub fn values(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.value).collect()
    }

    /// Dates in order
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.observations.iter().map(|o| o.date).collect()
    }

    /// First observed date
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.observations.first().map(|o| o.date)
    }

    /// Last observed date
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.date)
    }

    /// Mean of the observed values
    pub fn mean(&self) -> Option<f64> {
        forecast_math::statistics::mean(&self.values())
    }

    /// Whether every observation is zero
    pub fn is_all_zero(&self) -> bool {
        !self.is_empty() && self.observations.iter().all(|o| o.value == 0.0)
    }

    /// Observations on or before `cutoff`
    pub fn until(&self, cutoff: NaiveDate) -> Self {
        Self {
            observations: self
                .observations
                .iter()
                .filter(|o| o.date <= cutoff)
                .cloned()
                .collect(),
            regressor_names: self.regressor_names.clone(),
        }
    }

    /// Observations strictly after `start` and on or before `end`
    pub fn window(&self, start: NaiveDate, end: NaiveDate) -> &[Observation] {
        let from = self.observations.partition_point(|o| o.date <= start);
        let to = self.observations.partition_point(|o| o.date <= end);
        &self.observations[from..to]
    }
}

/// Loader for tabular sales exports
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load raw records from a CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<RawRecord>> {
        let file = File::open(path)?;
        // Use polars DataFrame reader directly
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;

        Self::from_dataframe(&df)
    }

    /// Convert every row of a DataFrame into a raw record
    pub fn from_dataframe(df: &DataFrame) -> Result<Vec<RawRecord>> {
        let mut records = vec![RawRecord::new(); df.height()];

        for column in df.get_columns() {
            let name = column.name().to_string();
            let values = Self::column_values(column)?;
            for (record, value) in records.iter_mut().zip(values) {
                record.insert(&name, value);
            }
        }

        Ok(records)
    }

    /// Read a column as raw cells, keeping numbers numeric and everything else as text
    fn column_values(column: &Series) -> Result<Vec<RawValue>> {
        let dtype = column.dtype();

        if dtype.is_numeric() || *dtype == DataType::Boolean {
            let cast = column.cast(&DataType::Float64)?;
            return Ok(cast
                .f64()?
                .into_iter()
                .map(|v| match v {
                    Some(v) if !v.is_nan() => RawValue::Number(v),
                    _ => RawValue::Missing,
                })
                .collect());
        }

        let cast = column.cast(&DataType::Utf8)?;
        Ok(cast
            .utf8()?
            .into_iter()
            .map(|v| match v {
                Some(text) => RawValue::Text(text.to_string()),
                None => RawValue::Missing,
            })
            .collect())
    }
}
