//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "01-bootstrap"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Live metrics bus exports and error types."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Per-classroom live sample distribution.
//!
//! A classroom that is switched on gets a generation timer; every tick
//! produces one [`cems_sim::Sample`] which is pushed to that classroom's
//! subscribers in registration order. Switching off cancels the timer and
//! pushes a single offline sample.

pub mod bus;
pub mod metrics;
pub mod schedule;
pub mod sink;

use cems_common::IdError;
use thiserror::Error;

pub use bus::{LiveMetricsBus, LiveMetricsBusBuilder, Subscription, SubscriptionId};
pub use metrics::{BusMetrics, BusMetricsExporter};
pub use schedule::{PeriodicTicker, TimerToken};
pub use sink::{ChannelSink, FnSink, JsonLinesSink, RecordingSink, SampleSink, TracingSink};

/// Failures constructing or configuring the bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("live metrics bus requires a tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
    #[error("invalid classroom id in bus configuration: {0}")]
    InvalidId(#[from] IdError),
    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Failures reported by a single sink. The bus logs them and moves on.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink closed: {0}")]
    Closed(String),
    #[error("sink rejected sample: {0}")]
    Rejected(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BusError>;
