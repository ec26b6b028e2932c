//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Electricity cost estimates from historical series."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use cems_common::BillingConfig;
use serde::Serialize;

use crate::frames::{ClassroomSeries, SeriesPoint};
use crate::generator::Granularity;

/// Energy and cost over one dashboard range.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillEstimate {
    pub range: Granularity,
    pub units_kwh: f64,
    pub unit_price: f64,
    pub currency: String,
    pub cost: f64,
}

/// Sum `power * hours_per_point` over the points and price the resulting kWh.
///
/// Each hourly point stands for one hour, each daily point for 24.
pub fn estimate_bill(
    points: &[SeriesPoint],
    range: Granularity,
    billing: &BillingConfig,
) -> BillEstimate {
    let hours = range.hours_per_bucket();
    let watt_hours: f64 = points.iter().map(|p| f64::from(p.power) * hours).sum();
    let units_kwh = watt_hours / 1000.0;
    BillEstimate {
        range,
        units_kwh,
        unit_price: billing.unit_price,
        currency: billing.currency.clone(),
        cost: units_kwh * billing.unit_price,
    }
}

/// Bill for the matching slice of a classroom series.
pub fn estimate_series_bill(
    series: &ClassroomSeries,
    range: Granularity,
    billing: &BillingConfig,
) -> BillEstimate {
    let points = match range {
        Granularity::Today => &series.today,
        Granularity::Week => &series.week,
        Granularity::Month => &series.month,
    };
    estimate_bill(points, range, billing)
}
