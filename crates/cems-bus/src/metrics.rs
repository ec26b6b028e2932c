//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Delivery counters and prometheus export for the live bus."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};

use prometheus::{IntCounter, IntGauge, Opts, Registry};

/// Snapshot of bus activity since construction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BusMetrics {
    /// Samples handed to the dispatcher, live and offline alike.
    pub published: u64,
    /// Successful sink notifications.
    pub delivered: u64,
    /// Sink notifications that returned an error or panicked.
    pub failed: u64,
    pub timers_started: u64,
    pub timers_stopped: u64,
}

/// Prometheus view of the same counters.
#[derive(Clone, Debug)]
pub struct BusMetricsExporter {
    published: IntCounter,
    delivered: IntCounter,
    failed: IntCounter,
    timers_started: IntCounter,
    timers_stopped: IntCounter,
    active_timers: IntGauge,
}

impl BusMetricsExporter {
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let published = IntCounter::with_opts(Opts::new(
            "cems_samples_published_total",
            "Samples dispatched by the live metrics bus",
        ))?;
        registry.register(Box::new(published.clone()))?;

        let delivered = IntCounter::with_opts(Opts::new(
            "cems_sink_deliveries_total",
            "Sample notifications accepted by subscribers",
        ))?;
        registry.register(Box::new(delivered.clone()))?;

        let failed = IntCounter::with_opts(Opts::new(
            "cems_sink_failures_total",
            "Sample notifications that failed or panicked",
        ))?;
        registry.register(Box::new(failed.clone()))?;

        let timers_started = IntCounter::with_opts(Opts::new(
            "cems_timers_started_total",
            "Generation timers started by switch-on transitions",
        ))?;
        registry.register(Box::new(timers_started.clone()))?;

        let timers_stopped = IntCounter::with_opts(Opts::new(
            "cems_timers_stopped_total",
            "Generation timers cancelled by switch-off transitions",
        ))?;
        registry.register(Box::new(timers_stopped.clone()))?;

        let active_timers = IntGauge::with_opts(Opts::new(
            "cems_active_timers",
            "Classrooms currently generating live samples",
        ))?;
        registry.register(Box::new(active_timers.clone()))?;

        Ok(Self {
            published,
            delivered,
            failed,
            timers_started,
            timers_stopped,
            active_timers,
        })
    }
}

/// Atomic counters mirrored into an optional exporter.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    timers_started: AtomicU64,
    timers_stopped: AtomicU64,
    exporter: Option<BusMetricsExporter>,
}

impl Counters {
    pub(crate) fn new(exporter: Option<BusMetricsExporter>) -> Self {
        Self {
            exporter,
            ..Self::default()
        }
    }

    pub(crate) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
        if let Some(exporter) = &self.exporter {
            exporter.published.inc();
        }
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        if let Some(exporter) = &self.exporter {
            exporter.delivered.inc();
        }
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        if let Some(exporter) = &self.exporter {
            exporter.failed.inc();
        }
    }

    pub(crate) fn record_timer_started(&self) {
        self.timers_started.fetch_add(1, Ordering::Relaxed);
        if let Some(exporter) = &self.exporter {
            exporter.timers_started.inc();
            exporter.active_timers.inc();
        }
    }

    pub(crate) fn record_timer_stopped(&self) {
        self.timers_stopped.fetch_add(1, Ordering::Relaxed);
        if let Some(exporter) = &self.exporter {
            exporter.timers_stopped.inc();
            exporter.active_timers.dec();
        }
    }

    pub(crate) fn snapshot(&self) -> BusMetrics {
        BusMetrics {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timers_started: self.timers_started.load(Ordering::Relaxed),
            timers_stopped: self.timers_stopped.load(Ordering::Relaxed),
        }
    }
}
