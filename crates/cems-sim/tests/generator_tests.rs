//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "integration-tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Integration tests for the classroom metric generator."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use cems_common::{BillingConfig, ClassroomId, GeneratorConfig};
use cems_sim::{estimate_series_bill, Granularity, MetricGenerator};
use chrono::{TimeZone, Utc};

fn classroom(raw: u32) -> ClassroomId {
    ClassroomId::new(raw).expect("positive id")
}

#[test]
fn every_classroom_reading_stays_above_the_floor() {
    let generator = MetricGenerator::default();
    let now = Utc::now();
    for raw in 1..=30 {
        let sample = generator.live_sample(classroom(raw));
        assert!(sample.power >= 100, "classroom {raw} dipped to {}", sample.power);
        let series = generator.historical_series_at(classroom(raw), now);
        for point in series.today.iter().chain(&series.week).chain(&series.month) {
            assert!(point.power >= 100);
            assert!(point.carbon_emission >= 0.0);
        }
    }
}

#[test]
fn classroom_three_hour_ten_emission_matches_power() {
    let generator = MetricGenerator::default();
    let series = generator.historical_series(classroom(3));
    let bucket = &series.today[10];
    assert_eq!(bucket.hour, Some(10));
    let power_kw = f64::from(bucket.power) / 1000.0;
    let expected = (power_kw * 1.0 * 0.5 * 100.0).round() / 100.0;
    assert_eq!(bucket.carbon_emission, expected);
}

#[test]
fn custom_emission_factor_flows_into_series() {
    let generator = MetricGenerator::new(GeneratorConfig {
        emission_factor: 1.0,
        ..GeneratorConfig::default()
    });
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let week = generator.series_at(classroom(11), Granularity::Week, now);
    for point in &week {
        let expected = (f64::from(point.power) / 1000.0 * 24.0 * 100.0).round() / 100.0;
        assert_eq!(point.carbon_emission, expected);
    }
}

#[test]
fn bill_uses_the_matching_series_slice() {
    let generator = MetricGenerator::default();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let series = generator.historical_series_at(classroom(2), now);
    let billing = BillingConfig::default();

    let daily = estimate_series_bill(&series, Granularity::Today, &billing);
    let expected_kwh: f64 = series.today.iter().map(|p| f64::from(p.power)).sum::<f64>() / 1000.0;
    assert!((daily.units_kwh - expected_kwh).abs() < 1e-9);

    let monthly = estimate_series_bill(&series, Granularity::Month, &billing);
    let expected_kwh: f64 =
        series.month.iter().map(|p| f64::from(p.power) * 24.0).sum::<f64>() / 1000.0;
    assert!((monthly.units_kwh - expected_kwh).abs() < 1e-9);
    assert!((monthly.cost - expected_kwh * 7.72).abs() < 1e-6);
}

#[test]
fn report_serializes_with_dashboard_field_names() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let report = MetricGenerator::default().report_at(classroom(29), now);
    let value = serde_json::to_value(&report).expect("serialize report");
    assert_eq!(value["classroomName"], "FUB-801");
    assert_eq!(value["floor"], 8);
    assert_eq!(value["classroomId"], 29);
    assert_eq!(value["data"]["today"].as_array().map(Vec::len), Some(24));
    assert_eq!(value["data"]["week"].as_array().map(Vec::len), Some(7));
    assert_eq!(value["data"]["month"].as_array().map(Vec::len), Some(30));
    assert_eq!(value["data"]["week"][6]["date"], "2024-06-01");
}
