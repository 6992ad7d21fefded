use chrono::NaiveDate;
use demand_forecast::data::{RawRecord, RawValue};
use demand_forecast::preparation::{DataPipeline, PreparationConfig};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 6, d).unwrap()
}

fn row(d: u32, value: f64, promo: f64) -> RawRecord {
    RawRecord::new()
        .with("date", RawValue::Date(day(d)))
        .with("quantity", RawValue::Number(value))
        .with("onpromotion", RawValue::Number(promo))
}

fn pipeline(quantiles: Option<(f64, f64)>) -> DataPipeline {
    DataPipeline::new(PreparationConfig {
        outlier_quantiles: quantiles,
        ..PreparationConfig::default()
    })
    .unwrap()
}

#[test]
fn test_exact_duplicates_are_dropped() {
    let records = vec![row(1, 5.0, 0.0), row(1, 5.0, 0.0), row(2, 7.0, 0.0)];
    let series = pipeline(None).prepare(&records).unwrap();
    assert_eq!(series.values(), vec![5.0, 7.0]);
}

#[test]
fn test_same_day_rows_are_aggregated() {
    let records = vec![
        row(3, 4.0, 0.0),
        row(1, 2.0, 0.0),
        row(1, 3.0, 1.0),
        row(3, 6.0, 0.0),
    ];
    let series = pipeline(None).prepare(&records).unwrap();

    assert_eq!(series.dates(), vec![day(1), day(3)]);
    assert_eq!(series.values(), vec![5.0, 10.0]);
    assert_eq!(series.observations()[0].regressor("onpromotion"), 1.0);
    assert_eq!(series.observations()[1].regressor("onpromotion"), 0.0);
}

#[rstest]
#[case("ds", "y")]
#[case("Date", "Sales")]
#[case("timestamp", "units_sold")]
#[case("day", "demand")]
fn test_alternate_column_names(#[case] date_column: &str, #[case] value_column: &str) {
    let records = vec![RawRecord::new()
        .with(date_column, RawValue::Text("2023-06-04".to_string()))
        .with(value_column, RawValue::Number(9.0))];
    let series = pipeline(None).prepare(&records).unwrap();

    assert_eq!(series.len(), 1);
    assert_eq!(series.first_date(), Some(day(4)));
    assert_eq!(series.values(), vec![9.0]);
}

#[rstest]
#[case(vec![("date", RawValue::Date(day(1)))])]
#[case(vec![("quantity", RawValue::Number(3.0))])]
#[case(vec![("store", RawValue::Text("A".to_string()))])]
fn test_missing_canonical_column_gives_empty_series(#[case] cells: Vec<(&str, RawValue)>) {
    let record = cells
        .into_iter()
        .fold(RawRecord::new(), |record, (column, value)| record.with(column, value));
    let series = pipeline(None).prepare(&[record]).unwrap();
    assert!(series.is_empty());
}

#[test]
fn test_outliers_are_capped() {
    let mut records: Vec<RawRecord> = (1..=30).map(|d| row(d, 10.0, 0.0)).collect();
    records[14] = row(15, 10_000.0, 0.0);

    let series = pipeline(Some((0.0, 0.9))).prepare(&records).unwrap();
    let max = series.values().into_iter().fold(0.0, f64::max);
    assert!(max < 10_000.0);
    assert!(series.values().iter().all(|v| *v >= 10.0));
}

#[test]
fn test_missing_days_filled_when_configured() {
    let pipeline = DataPipeline::new(PreparationConfig {
        outlier_quantiles: None,
        fill_missing_days: Some(0.0),
        ..PreparationConfig::default()
    })
    .unwrap();
    let series = pipeline
        .prepare(&[row(1, 4.0, 1.0), row(4, 8.0, 0.0)])
        .unwrap();

    assert_eq!(series.values(), vec![4.0, 0.0, 0.0, 8.0]);
    assert_eq!(series.observations()[1].regressor("onpromotion"), 0.0);
}

#[test]
fn test_gaps_kept_by_default() {
    let series = pipeline(None)
        .prepare(&[row(1, 4.0, 0.0), row(4, 8.0, 0.0)])
        .unwrap();
    assert_eq!(series.len(), 2);
}

#[test]
fn test_invalid_quantiles_rejected() {
    let result = DataPipeline::new(PreparationConfig {
        outlier_quantiles: Some((0.9, 0.1)),
        ..PreparationConfig::default()
    });
    assert!(result.is_err());
}

#[test]
fn test_forward_fill_follows_date_order() {
    let missing = RawRecord::new()
        .with("date", RawValue::Date(day(2)))
        .with("quantity", RawValue::Missing)
        .with("onpromotion", RawValue::Number(0.0));
    let records = vec![row(1, 5.0, 0.0), row(3, 9.0, 0.0), missing];

    let series = pipeline(None).prepare(&records).unwrap();

    assert_eq!(series.dates(), vec![day(1), day(2), day(3)]);
    assert_eq!(series.values(), vec![5.0, 5.0, 9.0]);
}

#[test]
fn test_leading_gap_in_date_order_defaults_to_zero() {
    let missing = RawRecord::new()
        .with("date", RawValue::Text("2023-06-01".to_string()))
        .with("quantity", RawValue::Missing);
    let records = vec![row(4, 8.0, 1.0), row(2, 6.0, 0.0), missing];

    let series = pipeline(None).prepare(&records).unwrap();

    assert_eq!(series.values(), vec![0.0, 6.0, 8.0]);
}
