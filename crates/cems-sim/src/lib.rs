//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "01-bootstrap"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Simulation module exports and shared types."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Deterministic metric generation for the classroom monitoring core.
//!
//! Every classroom gets a stable load profile derived from its id; readings
//! still move with wall-clock time. Building layout and bill estimation sit
//! alongside because both are derived from the same series.

pub mod billing;
pub mod building;
pub mod frames;
pub mod generator;

pub use billing::{estimate_bill, estimate_series_bill, BillEstimate};
pub use building::{classroom_info, classrooms_on_floor, ClassroomInfo};
pub use frames::{ClassroomReport, ClassroomSeries, Sample, SeriesPoint};
pub use generator::{
    seeded_random, ClassroomProfile, Granularity, GranularityError, MetricGenerator,
};
