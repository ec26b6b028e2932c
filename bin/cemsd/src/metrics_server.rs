//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Prometheus scrape endpoint for the daemon."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use cems_bus::BusMetricsExporter;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Registry backing `/metrics`. Bus counters are attached through
/// [`MetricsEndpoint::bus_exporter`] before the endpoint starts serving.
#[derive(Clone, Default)]
pub struct MetricsEndpoint {
    registry: Arc<Registry>,
}

impl MetricsEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bus_exporter(&self) -> Result<BusMetricsExporter> {
        BusMetricsExporter::register(&self.registry).context("failed to register bus metrics")
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<ServingEndpoint> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind metrics listener {addr}"))?;
        let addr = listener
            .local_addr()
            .context("failed to read metrics listener address")?;
        let app = Router::new()
            .route("/metrics", get(scrape))
            .with_state(self.registry);

        let stop = Arc::new(Notify::new());
        let stopped = stop.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { stopped.notified().await })
                .await
                .context("metrics endpoint failed")
        });
        info!(address = %addr, "metrics endpoint listening");
        Ok(ServingEndpoint { addr, stop, task })
    }
}

async fn scrape(State(registry): State<Arc<Registry>>) -> Response {
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&registry.gather()) {
        Ok(body) => ([(header::CONTENT_TYPE, encoder.format_type())], body).into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode bus metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub struct ServingEndpoint {
    addr: SocketAddr,
    stop: Arc<Notify>,
    task: JoinHandle<Result<()>>,
}

impl ServingEndpoint {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting scrapes and wait for in-flight ones to finish.
    pub async fn stop(self) -> Result<()> {
        self.stop.notify_one();
        self.task.await.context("metrics endpoint task panicked")?
    }
}
