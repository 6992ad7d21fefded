//! Read-only collaborators: historical demand and the holiday calendar

use crate::data::{DataLoader, HolidayEntry, RawRecord, RawValue, SalesRecord};
use crate::error::Result;
use polars::prelude::DataFrame;
use std::collections::HashMap;
use std::path::Path;

/// Source of historical demand rows
pub trait HistoricalDataSource: Send + Sync {
    /// Rows for one entity, or for everything when `entity_key` is `None`
    ///
    /// Rows may arrive unordered, duplicated or with alternate column names;
    /// an empty result is valid.
    fn get_series(&self, entity_key: Option<&str>) -> Result<Vec<RawRecord>>;
}

/// Source of holidays and named events
pub trait HolidayCalendar: Send + Sync {
    /// Every known holiday
    fn get_holidays(&self) -> Result<Vec<HolidayEntry>>;
}

/// In-memory history keyed by entity
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    series: HashMap<String, Vec<SalesRecord>>,
}

impl InMemoryHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the sales rows of one entity
    pub fn with_entity(mut self, entity_key: &str, records: Vec<SalesRecord>) -> Self {
        self.series
            .entry(entity_key.to_string())
            .or_default()
            .extend(records);
        self
    }
}

impl HistoricalDataSource for InMemoryHistory {
    fn get_series(&self, entity_key: Option<&str>) -> Result<Vec<RawRecord>> {
        let records: Vec<RawRecord> = match entity_key {
            Some(key) => self
                .series
                .get(key)
                .map(|rows| rows.iter().map(RawRecord::from).collect())
                .unwrap_or_default(),
            None => {
                let mut keys: Vec<&String> = self.series.keys().collect();
                keys.sort();
                keys.into_iter()
                    .flat_map(|k| self.series[k].iter().map(RawRecord::from))
                    .collect()
            }
        };
        Ok(records)
    }
}

/// History read from a tabular export (CSV file or DataFrame)
#[derive(Debug, Clone)]
pub struct TabularHistory {
    records: Vec<RawRecord>,
    entity_column: Option<String>,
}

impl TabularHistory {
    /// Load from a CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            records: DataLoader::from_csv(path)?,
            entity_column: None,
        })
    }

    /// Load from an existing DataFrame
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        Ok(Self {
            records: DataLoader::from_dataframe(df)?,
            entity_column: None,
        })
    }

    /// Column used to filter rows by entity key
    pub fn with_entity_column(mut self, column: &str) -> Self {
        self.entity_column = Some(column.to_string());
        self
    }

    fn matches(record: &RawRecord, column: &str, key: &str) -> bool {
        match record.get(column) {
            Some(RawValue::Text(text)) => text.trim() == key,
            Some(RawValue::Number(n)) => key.parse::<f64>().map(|k| k == *n).unwrap_or(false),
            _ => false,
        }
    }
}

impl HistoricalDataSource for TabularHistory {
    fn get_series(&self, entity_key: Option<&str>) -> Result<Vec<RawRecord>> {
        match (entity_key, &self.entity_column) {
            (Some(key), Some(column)) => Ok(self
                .records
                .iter()
                .filter(|r| Self::matches(r, column, key))
                .cloned()
                .collect()),
            _ => Ok(self.records.clone()),
        }
    }
}

/// In-memory holiday calendar
#[derive(Debug, Clone, Default)]
pub struct InMemoryCalendar {
    holidays: Vec<HolidayEntry>,
}

impl InMemoryCalendar {
    /// Create a calendar from a list of entries
    pub fn new(holidays: Vec<HolidayEntry>) -> Self {
        Self { holidays }
    }
}

impl HolidayCalendar for InMemoryCalendar {
    fn get_holidays(&self) -> Result<Vec<HolidayEntry>> {
        Ok(self.holidays.clone())
    }
}
