//! huginnd: the Huginn exporter daemon.
//!
//! Loads metric definitions from a YAML file, collects them periodically
//! and serves the results on a Prometheus scrape endpoint.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};

use huginn::server::{Exporter, ExporterConfig, serve};
use huginn::{HuginnError, MetricRegistry, Scheduler, config};

/// Huginn daemon: cloud API calls as Prometheus metrics.
#[derive(Parser)]
#[command(name = "huginnd")]
#[command(version = huginn::PKG_VERSION)]
#[command(about = "Declarative cloud API metrics exporter")]
struct Args {
    /// Path to a YAML-formatted metrics file.
    #[arg(short = 'f', long, value_name = "PATH", env = "HUGINN_METRICS_FILE")]
    metrics_file: PathBuf,

    /// Listen on this port (overrides the configured address's port).
    #[arg(short, long, value_name = "PORT", env = "HUGINN_PORT")]
    port: Option<u16>,

    /// Seconds between metric refreshes [default: 300].
    #[arg(short = 's', long, value_name = "SECONDS")]
    period_seconds: Option<u64>,

    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Constant label attached to every series, as name=value. Repeatable.
    #[arg(long = "label", value_name = "NAME=VALUE", value_parser = parse_label)]
    labels: Vec<(String, String)>,

    /// Collect every metric once, print the exposition and exit.
    #[arg(long)]
    once: bool,
}

fn parse_label(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty label name in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(Args::parse()).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "huginnd failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> huginn::Result<ExitCode> {
    let settings = ExporterConfig::load(args.config.as_deref())?;
    let definitions = config::load_file(&args.metrics_file)?;

    let mut labels: BTreeMap<String, String> = settings.labels.clone();
    labels.extend(args.labels);

    let registry = MetricRegistry::with_const_labels(definitions, labels)?;
    let client = settings.build_client()?;
    let period = Duration::from_secs(args.period_seconds.unwrap_or(settings.collection.period_secs));
    if period.is_zero() {
        return Err(HuginnError::Configuration("period must be at least one second".into()));
    }
    let scheduler = Scheduler::new(registry.clone(), client)
        .period(period)
        .concurrency(settings.collection.concurrency);

    info!(
        version = huginn::PKG_VERSION,
        metrics = registry.slots().len(),
        file = %args.metrics_file.display(),
        "huginnd starting"
    );

    if args.once {
        let summary = scheduler.run_once().await;
        print!("{}", registry.render()?);
        info!(published = summary.published, failed = summary.failed, "single pass complete");
        return Ok(if summary.failed == 0 {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let mut addr: SocketAddr = settings
        .server
        .address
        .parse()
        .map_err(|e| HuginnError::Configuration(format!("Invalid address: {e}")))?;
    if let Some(port) = args.port {
        addr.set_port(port);
    }

    let mut exporter = Exporter::new(registry);
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => exporter = exporter.with_telemetry(handle),
        Err(e) => warn!(error = %e, "telemetry recorder unavailable"),
    }

    let handle = scheduler.spawn();
    tokio::select! {
        result = serve(addr, exporter) => result?,
        _ = tokio::signal::ctrl_c() => info!("caught interrupt, stopping"),
    }
    handle.shutdown().await;
    info!("done");
    Ok(ExitCode::SUCCESS)
}
