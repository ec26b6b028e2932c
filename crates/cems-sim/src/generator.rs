//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Deterministic synthetic readings per classroom."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use cems_common::{ClassroomId, GeneratorConfig};
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::building::classroom_info;
use crate::frames::{ClassroomReport, ClassroomSeries, Sample, SeriesPoint};

/// Sub-samples averaged into each daily bucket.
const SAMPLES_PER_DAY: u32 = 24;

/// Map a real-valued seed onto `[0, 1)`.
///
/// Fractional part of `sin(seed) * 10000`: not statistically rigorous, but the
/// same seed always yields the same value and nearby seeds diverge quickly.
pub fn seeded_random(seed: f64) -> f64 {
    let x = seed.sin() * 10_000.0;
    x - x.floor()
}

/// Stable statistical profile of one classroom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassroomProfile {
    pub seed: f64,
    /// Scales the base load, in `[0.5, 2.0)`.
    pub base_multiplier: f64,
    /// Width of the noise band in watts, in `[100, 400)`.
    pub variance_w: f64,
}

/// Time granularity of a historical series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    /// 24 hourly buckets for the current day.
    #[serde(rename = "1d", alias = "today")]
    Today,
    /// 7 daily buckets ending today.
    #[serde(rename = "7d", alias = "week")]
    Week,
    /// 30 daily buckets ending today.
    #[serde(rename = "30d", alias = "month")]
    Month,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Granularity::Today, Granularity::Week, Granularity::Month];

    pub fn bucket_count(self) -> u32 {
        match self {
            Granularity::Today => 24,
            Granularity::Week => 7,
            Granularity::Month => 30,
        }
    }

    pub fn hours_per_bucket(self) -> f64 {
        match self {
            Granularity::Today => 1.0,
            Granularity::Week | Granularity::Month => 24.0,
        }
    }

    /// Dashboard range label (`1d`, `7d`, `30d`).
    pub fn label(self) -> &'static str {
        match self {
            Granularity::Today => "1d",
            Granularity::Week => "7d",
            Granularity::Month => "30d",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown range '{0}', expected one of 1d, 7d, 30d")]
pub struct GranularityError(pub String);

impl FromStr for Granularity {
    type Err = GranularityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1d" | "today" => Ok(Granularity::Today),
            "7d" | "week" => Ok(Granularity::Week),
            "30d" | "month" => Ok(Granularity::Month),
            other => Err(GranularityError(other.to_owned())),
        }
    }
}

/// Produces reproducible, time-varying readings for any classroom id.
///
/// All operations are total: every positive id gets a profile, and power
/// never drops below `min_power_w`.
#[derive(Debug, Clone, Default)]
pub struct MetricGenerator {
    config: GeneratorConfig,
}

impl MetricGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn profile(&self, id: ClassroomId) -> ClassroomProfile {
        let seed = id.as_f64() * self.config.seed_multiplier;
        ClassroomProfile {
            seed,
            base_multiplier: 0.5 + seeded_random(seed) * 1.5,
            variance_w: 100.0 + seeded_random(seed + 1.0) * 300.0,
        }
    }

    pub fn live_sample(&self, id: ClassroomId) -> Sample {
        self.live_sample_at(id, Utc::now())
    }

    /// Reading at `now`; values only change once per whole second.
    pub fn live_sample_at(&self, id: ClassroomId, now: DateTime<Utc>) -> Sample {
        let profile = self.profile(id);
        let time_seed = whole_seconds(now) + id.as_f64();
        let power = self.power(&profile, seeded_random(time_seed));
        Sample {
            classroom_id: id,
            timestamp: now,
            power,
            current: self.current_ma(power),
            voltage: self.voltage(seeded_random(time_seed + 100.0)),
            offline: false,
        }
    }

    pub fn historical_series(&self, id: ClassroomId) -> ClassroomSeries {
        self.historical_series_at(id, Utc::now())
    }

    pub fn historical_series_at(&self, id: ClassroomId, now: DateTime<Utc>) -> ClassroomSeries {
        ClassroomSeries {
            today: self.series_at(id, Granularity::Today, now),
            week: self.series_at(id, Granularity::Week, now),
            month: self.series_at(id, Granularity::Month, now),
        }
    }

    pub fn series(&self, id: ClassroomId, granularity: Granularity) -> Vec<SeriesPoint> {
        self.series_at(id, granularity, Utc::now())
    }

    /// One point per bucket, ordered oldest to newest.
    pub fn series_at(
        &self,
        id: ClassroomId,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> Vec<SeriesPoint> {
        let profile = self.profile(id);
        let seed = profile.seed;
        let t = whole_seconds(now);
        let today = now.date_naive();
        let buckets = granularity.bucket_count();

        (0..buckets)
            .map(|bucket| {
                let b = f64::from(bucket);
                let (hour, date, random_factor, voltage_factor) = match granularity {
                    Granularity::Today => (
                        Some(bucket as u8),
                        today,
                        seeded_random(seed + b + 2.0 + t),
                        seeded_random(seed + b + 100.0 + t),
                    ),
                    Granularity::Week => (
                        None,
                        days_before(today, buckets - 1 - bucket),
                        daily_mean(seed + b * 100.0 + t),
                        seeded_random(seed + b + 200.0 + t),
                    ),
                    Granularity::Month => (
                        None,
                        days_before(today, buckets - 1 - bucket),
                        daily_mean(seed + (b + 1.0) * 1000.0 + t),
                        seeded_random(seed + b + 300.0 + t),
                    ),
                };
                let power = self.power(&profile, random_factor);
                SeriesPoint {
                    hour,
                    date,
                    power,
                    current: self.current_ma(power),
                    voltage: self.voltage(voltage_factor),
                    carbon_emission: self.carbon_emission(power, granularity.hours_per_bucket()),
                }
            })
            .collect()
    }

    pub fn report(&self, id: ClassroomId) -> ClassroomReport {
        self.report_at(id, Utc::now())
    }

    pub fn report_at(&self, id: ClassroomId, now: DateTime<Utc>) -> ClassroomReport {
        let info = classroom_info(id);
        ClassroomReport {
            success: true,
            classroom_id: id,
            classroom_name: info.name,
            floor: info.floor,
            data: self.historical_series_at(id, now),
        }
    }

    /// kg CO2 for `power_w` sustained over `hours`, rounded to two decimals.
    pub fn carbon_emission(&self, power_w: u32, hours: f64) -> f64 {
        round2(f64::from(power_w) / 1000.0 * hours * self.config.emission_factor)
    }

    fn power(&self, profile: &ClassroomProfile, random_factor: f64) -> u32 {
        let raw = self.config.base_load_w * profile.base_multiplier
            + (random_factor - 0.5) * profile.variance_w;
        let floored = raw.floor();
        if floored < f64::from(self.config.min_power_w) {
            self.config.min_power_w
        } else {
            // saturating float-to-int cast
            floored as u32
        }
    }

    fn current_ma(&self, power_w: u32) -> u32 {
        (f64::from(power_w) / self.config.nominal_voltage_v * 1000.0).floor() as u32
    }

    fn voltage(&self, factor: f64) -> f64 {
        let jitter = self.config.voltage_jitter_v;
        self.config.nominal_voltage_v + factor * 2.0 * jitter - jitter
    }
}

fn daily_mean(base_seed: f64) -> f64 {
    let total: f64 = (0..SAMPLES_PER_DAY)
        .map(|h| seeded_random(base_seed + f64::from(h)))
        .sum();
    total / f64::from(SAMPLES_PER_DAY)
}

fn whole_seconds(now: DateTime<Utc>) -> f64 {
    now.timestamp() as f64
}

fn days_before(today: NaiveDate, days: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn id(raw: u32) -> ClassroomId {
        ClassroomId::new(raw).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn seeded_random_is_deterministic_and_bounded() {
        for seed in [0.0, 1.0, 12345.0, 370_350.0, 1.7e9, -42.5] {
            let first = seeded_random(seed);
            assert_eq!(first, seeded_random(seed));
            assert!((0.0..1.0).contains(&first), "seed {seed} produced {first}");
        }
        assert_ne!(seeded_random(12345.0), seeded_random(12346.0));
    }

    #[test]
    fn profiles_are_stable_and_within_bands() {
        let generator = MetricGenerator::default();
        for raw in 1..=30 {
            let profile = generator.profile(id(raw));
            assert_eq!(profile, generator.profile(id(raw)));
            assert!((0.5..2.0).contains(&profile.base_multiplier));
            assert!((100.0..400.0).contains(&profile.variance_w));
        }
        assert_ne!(generator.profile(id(1)), generator.profile(id(2)));
    }

    #[test]
    fn live_samples_respect_floor_and_derivations() {
        let generator = MetricGenerator::default();
        let start = 1_700_000_000;
        for raw in [1, 2, 7, 30, 999] {
            for offset in 0..50 {
                let sample = generator.live_sample_at(id(raw), at(start + offset * 7));
                assert!(sample.power >= 100);
                assert!(!sample.offline);
                assert_eq!(
                    sample.current,
                    (f64::from(sample.power) / 230.0 * 1000.0).floor() as u32
                );
                assert!((225.0..235.0).contains(&sample.voltage));
            }
        }
    }

    #[test]
    fn live_samples_only_change_per_whole_second() {
        let generator = MetricGenerator::default();
        let base = at(1_700_000_000);
        let a = generator.live_sample_at(id(4), base);
        let b = generator.live_sample_at(id(4), base + Duration::milliseconds(900));
        assert_eq!(a.power, b.power);
        assert_eq!(a.voltage, b.voltage);
    }

    #[test]
    fn floor_is_applied_when_the_load_is_below_it() {
        let generator = MetricGenerator::new(GeneratorConfig {
            min_power_w: 10_000,
            ..GeneratorConfig::default()
        });
        let sample = generator.live_sample_at(id(3), at(1_700_000_000));
        assert_eq!(sample.power, 10_000);
        assert_eq!(sample.current, 43_478);
    }

    #[test]
    fn today_series_has_24_ordered_hours() {
        let generator = MetricGenerator::default();
        let now = at(1_700_000_000);
        let today = generator.series_at(id(3), Granularity::Today, now);
        assert_eq!(today.len(), 24);
        for (index, point) in today.iter().enumerate() {
            assert_eq!(point.hour, Some(index as u8));
            assert_eq!(point.date, now.date_naive());
            assert!(point.power >= 100);
        }
    }

    #[test]
    fn daily_series_end_today_in_ascending_order() {
        let generator = MetricGenerator::default();
        let now = at(1_700_000_000);
        let series = generator.historical_series_at(id(12), now);
        assert_eq!(series.week.len(), 7);
        assert_eq!(series.month.len(), 30);
        for points in [&series.week, &series.month] {
            assert_eq!(points.last().unwrap().date, now.date_naive());
            assert!(points.windows(2).all(|w| w[0].date + Duration::days(1) == w[1].date));
            assert!(points.iter().all(|p| p.hour.is_none()));
        }
        assert_eq!(
            series.month[0].date,
            now.date_naive() - Duration::days(29)
        );
    }

    #[test]
    fn carbon_emission_follows_power_and_duration() {
        let generator = MetricGenerator::default();
        let series = generator.historical_series_at(id(3), at(1_700_000_000));
        let bucket = &series.today[10];
        let expected = ((f64::from(bucket.power) / 1000.0) * 1.0 * 0.5 * 100.0).round() / 100.0;
        assert_eq!(bucket.carbon_emission, expected);

        let day = &series.week[3];
        let expected = ((f64::from(day.power) / 1000.0) * 24.0 * 0.5 * 100.0).round() / 100.0;
        assert_eq!(day.carbon_emission, expected);
    }

    #[test]
    fn series_are_reproducible_for_a_fixed_instant() {
        let generator = MetricGenerator::default();
        let now = at(1_650_000_123);
        assert_eq!(
            generator.historical_series_at(id(8), now),
            generator.historical_series_at(id(8), now)
        );
    }

    #[test]
    fn report_envelope_names_the_room() {
        let report = MetricGenerator::default().report_at(id(6), at(1_700_000_000));
        assert!(report.success);
        assert_eq!(report.classroom_name, "FUB-202");
        assert_eq!(report.floor, 2);
        assert_eq!(report.data.today.len(), 24);
    }

    #[test]
    fn granularity_parses_dashboard_labels() {
        assert_eq!("1d".parse::<Granularity>().unwrap(), Granularity::Today);
        assert_eq!("7D".parse::<Granularity>().unwrap(), Granularity::Week);
        assert_eq!("month".parse::<Granularity>().unwrap(), Granularity::Month);
        assert!("90d".parse::<Granularity>().is_err());
        assert_eq!(Granularity::Month.to_string(), "30d");
    }

    #[test]
    fn granularity_serializes_as_its_label() {
        for range in Granularity::ALL {
            let rendered = serde_json::to_string(&range).unwrap();
            assert_eq!(rendered, format!("\"{}\"", range.label()));
        }
        let legacy: Granularity = serde_json::from_str("\"week\"").unwrap();
        assert_eq!(legacy, Granularity::Week);
    }
}
