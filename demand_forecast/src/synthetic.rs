//! Synthetic daily retail history for demos and tests

use crate::data::{RawRecord, SalesRecord};
use crate::error::{ForecastError, Result};
use crate::sources::HistoricalDataSource;
use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Bernoulli, Distribution, Uniform};

/// Share of days with a promotion
const PROMOTION_RATE: f64 = 0.1;

/// Seeded generator of daily demand
///
/// Base demand of 100 units, +50 on weekends, +80 through December, uniform
/// noise in `[-20, 20)` and roughly one promotion day in ten.
#[derive(Debug, Clone)]
pub struct SyntheticHistory {
    start: NaiveDate,
    end: NaiveDate,
    seed: u64,
    promotion_lift: f64,
}

impl SyntheticHistory {
    /// Generator over `start..=end`
    pub fn new(start: NaiveDate, end: NaiveDate, seed: u64) -> Result<Self> {
        if end < start {
            return Err(ForecastError::InvalidParameter(format!(
                "Synthetic range ends ({}) before it starts ({})",
                end, start
            )));
        }
        Ok(Self {
            start,
            end,
            seed,
            promotion_lift: 0.0,
        })
    }

    /// Two years of history, 2022-01-01 through 2024-01-01
    pub fn two_years(seed: u64) -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            seed,
            promotion_lift: 0.0,
        }
    }

    /// Extra units sold on promotion days
    pub fn with_promotion_lift(mut self, lift: f64) -> Self {
        self.promotion_lift = lift;
        self
    }

    /// Generate the sales rows; the same seed gives the same rows
    pub fn generate(&self) -> Result<Vec<SalesRecord>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let noise = Uniform::new(-20i32, 20);
        let promotion = Bernoulli::new(PROMOTION_RATE)
            .map_err(|e| ForecastError::InvalidParameter(e.to_string()))?;

        Ok(self
            .start
            .iter_days()
            .take_while(|date| *date <= self.end)
            .map(|date| {
                let mut base = 100.0;
                if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                    base += 50.0;
                }
                if date.month() == 12 {
                    base += 80.0;
                }
                let promoted = promotion.sample(&mut rng);
                if promoted {
                    base += self.promotion_lift;
                }
                let quantity = (base + f64::from(noise.sample(&mut rng))).max(0.0);
                SalesRecord::new(date, quantity, Some(if promoted { 1.0 } else { 0.0 }))
            })
            .collect())
    }
}

impl HistoricalDataSource for SyntheticHistory {
    fn get_series(&self, _entity_key: Option<&str>) -> Result<Vec<RawRecord>> {
        Ok(self.generate()?.iter().map(RawRecord::from).collect())
    }
}
