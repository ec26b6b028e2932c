//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Live samples and historical series points."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use cems_common::ClassroomId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

fn is_false(value: &bool) -> bool {
    !*value
}

/// One instantaneous reading for a classroom.
///
/// Serializes to the same shape as the external live feed:
/// `{"classroom":5,"time":"...","power":812,"current":3530,"voltage":231.4}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(rename = "classroom")]
    pub classroom_id: ClassroomId,
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    /// Watts.
    pub power: u32,
    /// Milliamps.
    pub current: u32,
    /// Volts.
    pub voltage: f64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub offline: bool,
}

impl Sample {
    /// Terminal sample published when generation stops.
    pub fn offline(classroom_id: ClassroomId, timestamp: DateTime<Utc>) -> Self {
        Self {
            classroom_id,
            timestamp,
            power: 0,
            current: 0,
            voltage: 0.0,
            offline: true,
        }
    }
}

/// One aggregated bucket of a historical series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    /// Hour of day for hourly buckets; absent for daily buckets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<u8>,
    pub date: NaiveDate,
    pub power: u32,
    pub current: u32,
    pub voltage: f64,
    /// kg CO2, rounded to two decimals.
    pub carbon_emission: f64,
}

/// The three fixed-cardinality series generated per classroom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassroomSeries {
    /// 24 hourly points, hours 0..=23.
    pub today: Vec<SeriesPoint>,
    /// 7 daily points ending today.
    pub week: Vec<SeriesPoint>,
    /// 30 daily points ending today.
    pub month: Vec<SeriesPoint>,
}

/// Report envelope pairing a series with the classroom's place in the building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomReport {
    pub success: bool,
    pub classroom_id: ClassroomId,
    pub classroom_name: String,
    pub floor: u32,
    pub data: ClassroomSeries,
}
