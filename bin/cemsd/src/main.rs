//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the CEMS daemon."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
mod metrics_server;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cems_bus::{JsonLinesSink, LiveMetricsBus, Subscription, TracingSink};
use cems_common::{init_tracing, AppConfig, ClassroomId};
use cems_sim::{estimate_series_bill, Granularity, MetricGenerator};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};

use crate::metrics_server::MetricsEndpoint;

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("CEMS ", env!("CARGO_PKG_VERSION")),
    about = "Classroom energy monitoring daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the live metrics bus until interrupted")]
    Run(RunArgs),
    #[command(about = "Print one live sample")]
    Sample {
        #[arg(long)]
        classroom: ClassroomId,
    },
    #[command(about = "Print a historical series (all ranges when --range is omitted)")]
    Series {
        #[arg(long)]
        classroom: ClassroomId,
        #[arg(long, help = "1d, 7d or 30d")]
        range: Option<Granularity>,
    },
    #[command(about = "Print the full classroom report")]
    Report {
        #[arg(long)]
        classroom: ClassroomId,
    },
    #[command(about = "Estimate the electricity bill for a range")]
    Bill {
        #[arg(long)]
        classroom: ClassroomId,
        #[arg(long, default_value = "1d", help = "1d, 7d or 30d")]
        range: Granularity,
    },
}

#[derive(Debug, Default, Args)]
struct RunArgs {
    #[arg(long, value_delimiter = ',', help = "Classrooms to switch on at startup")]
    on: Vec<ClassroomId>,

    #[arg(long, help = "Write every sample to stdout as JSON lines")]
    stream: bool,

    #[arg(long, value_name = "SECS", help = "Stop after this many seconds")]
    duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/cemsd.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let config = loaded.config;
    config.validate().context("configuration rejected")?;
    init_tracing("cemsd", &config.logging)?;
    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; using defaults"),
    }

    let generator = MetricGenerator::new(config.generator.clone());
    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run_daemon(config, generator, args).await?,
        Commands::Sample { classroom } => print_json(&generator.live_sample(classroom))?,
        Commands::Series { classroom, range } => match range {
            Some(range) => print_json(&generator.series(classroom, range))?,
            None => print_json(&generator.historical_series(classroom))?,
        },
        Commands::Report { classroom } => print_json(&generator.report(classroom))?,
        Commands::Bill { classroom, range } => {
            let series = generator.historical_series(classroom);
            print_json(&estimate_series_bill(&series, range, &config.billing))?
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}

/// Classrooms switched on at startup: the configured policy plus `--on`.
fn startup_classrooms(config: &AppConfig, extra: &[ClassroomId]) -> Result<Vec<ClassroomId>> {
    let mut ids = Vec::new();
    for raw in 1..=config.building.classroom_count {
        if config.building.initial_switch.state_for(raw) {
            ids.push(ClassroomId::new(raw)?);
        }
    }
    ids.extend_from_slice(extra);
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

async fn run_daemon(config: AppConfig, generator: MetricGenerator, args: RunArgs) -> Result<()> {
    let endpoint = config.metrics.enabled.then(MetricsEndpoint::new);
    let mut builder = LiveMetricsBus::builder(config.bus.clone()).generator(generator);
    if let Some(endpoint) = &endpoint {
        builder = builder.metrics(endpoint.bus_exporter()?);
    }
    let bus = builder.build()?;

    let metrics_endpoint = match endpoint {
        Some(endpoint) => {
            let serving = endpoint.serve(config.metrics.listen).await?;
            info!(address = %serving.addr(), "metrics exporter enabled");
            Some(serving)
        }
        None => {
            info!("metrics exporter disabled by configuration");
            None
        }
    };

    let stream = args
        .stream
        .then(|| Arc::new(JsonLinesSink::new(std::io::stdout())));
    let mut subscriptions: Vec<Subscription> = Vec::new();
    for raw in 1..=config.building.classroom_count {
        let classroom = ClassroomId::new(raw)?;
        subscriptions.push(bus.subscribe(classroom, Arc::new(TracingSink)));
        if let Some(sink) = &stream {
            subscriptions.push(bus.subscribe(classroom, sink.clone()));
        }
    }

    for classroom in startup_classrooms(&config, &args.on)? {
        if bus.is_external(classroom) {
            warn!(classroom = %classroom, "classroom is fed externally; recording state only");
        }
        bus.set_switch_state(classroom, true);
    }
    info!(
        classrooms = config.building.classroom_count,
        active = ?bus.active_classrooms(),
        "daemon running; waiting for termination signal"
    );

    match args.duration {
        Some(secs) => {
            tokio::select! {
                result = signal::ctrl_c() => {
                    result?;
                    info!("ctrl-c received; shutting down");
                }
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!(seconds = secs, "run duration elapsed; shutting down");
                }
            }
        }
        None => {
            signal::ctrl_c().await?;
            info!("ctrl-c received; shutting down");
        }
    }

    let stopped = bus.shutdown();
    for subscription in &subscriptions {
        subscription.unsubscribe();
    }
    let metrics = bus.metrics();
    info!(
        stopped,
        published = metrics.published,
        delivered = metrics.delivered,
        failed = metrics.failed,
        "live metrics bus drained"
    );

    if let Some(serving) = metrics_endpoint {
        serving.stop().await?;
    }
    Ok(())
}
