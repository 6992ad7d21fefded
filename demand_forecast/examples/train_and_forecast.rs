use chrono::NaiveDate;
use demand_forecast::sources::InMemoryCalendar;
use demand_forecast::{ForecastConfig, ForecastService, HolidayEntry, SyntheticHistory};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("Demand Forecast: Train and Forecast Example");
    println!("===========================================\n");

    let model_dir = std::env::temp_dir().join("demand_forecast_demo");
    let config = ForecastConfig {
        model_dir,
        ..ForecastConfig::default()
    };

    // Two years of synthetic sales, promotions worth +40 units
    let history = Arc::new(SyntheticHistory::two_years(42).with_promotion_lift(40.0));
    let calendar = Arc::new(InMemoryCalendar::new(vec![
        HolidayEntry::new(NaiveDate::from_ymd_opt(2022, 12, 25).ok_or("bad date")?, "Christmas"),
        HolidayEntry::new(NaiveDate::from_ymd_opt(2023, 12, 25).ok_or("bad date")?, "Christmas"),
    ]));
    let service = ForecastService::new(config, history, Some(calendar))?;

    println!("Training model...");
    let handle = service.train(false)?;
    println!("Started {}", handle.job_id());
    handle.wait()?;

    let status = service.training_status();
    println!("Training {}: {}\n", status.state, status.status);
    if let Some(error) = status.error {
        return Err(error.into());
    }

    if let Some(metrics) = service.last_metrics() {
        println!("{}", metrics);
    }

    println!("Next 14 days:");
    for point in service.predict(14, false)? {
        println!(
            "  {}: {:.1} ({:.1} - {:.1})",
            point.date, point.point_estimate, point.lower_bound, point.upper_bound
        );
    }

    println!("\nPromotion on the first 3 days:");
    let baseline = service.predict(7, false)?;
    let scenario = service.simulate(7, &[1.0, 1.0, 1.0])?;
    for (base, promo) in baseline.iter().zip(&scenario) {
        println!(
            "  {}: {:.1} -> {:.1}",
            promo.date, base.point_estimate, promo.point_estimate
        );
    }

    println!("\nFeature importance:");
    for feature in service.feature_importance()? {
        println!("  {}: {}", feature.regressor, feature.description);
    }

    let anomalies = service.detect_anomalies(1.0)?;
    println!("\n{} anomalies in the history", anomalies.len());
    for anomaly in anomalies.iter().take(5) {
        println!(
            "  {} {}: actual {:.1}, expected {:.1}",
            anomaly.date, anomaly.kind, anomaly.actual, anomaly.expected
        );
    }

    Ok(())
}
