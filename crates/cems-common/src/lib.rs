//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives for the classroom monitoring core."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Shared primitives for the CEMS workspace: classroom identifiers,
//! configuration loading, and tracing setup consumed by every crate.

pub mod config;
pub mod ids;
pub mod logging;

pub use config::{
    AppConfig, BillingConfig, BuildingConfig, BusConfig, GeneratorConfig, InitialSwitch,
    LoadedAppConfig, LoggingConfig, MetricsConfig, OfflinePolicy,
};
pub use ids::{ClassroomId, IdError};
pub use logging::{init_test_tracing, init_tracing, LogFormat};
