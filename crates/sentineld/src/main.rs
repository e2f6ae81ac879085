//! sentineld daemon
//!
//! Main entry point: loads configuration, starts the background scanner and
//! serves the HTTP API until Ctrl-C.

use anyhow::Context;
use clap::Parser;
use sentineld::bandwidth::BandwidthSampler;
use sentineld::config::DEFAULT_CONFIG_PATH;
use sentineld::{
    AppState, BandwidthMonitor, DeviceStore, IcmpProber, MetricsCollector, MetricsStore,
    NeighborDiscovery, Scanner, SentinelConfig, start_scanner,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "sentineld")]
#[command(version, about = "LAN bandwidth and device telemetry daemon")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// HTTP listen address, overrides api.listen_addr
    #[arg(short, long)]
    listen: Option<String>,

    /// Scan interval in seconds, overrides scanner.interval_secs
    #[arg(short, long)]
    interval: Option<u64>,

    /// Log filter directive (e.g. "debug" or "sentineld=trace"); RUST_LOG wins when set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("sentineld: Starting LAN telemetry daemon");

    let config = load_config(&args)?;

    match run_daemon(config).await {
        Ok(()) => {
            info!("sentineld: Daemon exiting normally");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "sentineld: Daemon exiting with error");
            Err(e)
        }
    }
}

/// Initialize structured logging
fn init_logging(default_directive: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .context("invalid log filter")?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("failed to set logger")?;
    Ok(())
}

/// Load the config file, apply CLI overrides and validate
fn load_config(args: &Args) -> anyhow::Result<SentinelConfig> {
    let mut config = SentinelConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    if let Some(listen) = &args.listen {
        config.api.listen_addr = listen.clone();
    }
    if let Some(interval) = args.interval {
        config.scanner.interval_secs = interval;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn run_daemon(config: SentinelConfig) -> anyhow::Result<()> {
    let metrics = MetricsCollector::new().context("failed to register metrics")?;
    let device_store = Arc::new(DeviceStore::new());
    let metrics_store = Arc::new(MetricsStore::new());

    let discovery = NeighborDiscovery::from_config(&config.discovery)?;
    let prober = Arc::new(IcmpProber::new());
    info!(identifier = prober.identifier(), "sentineld: ICMP prober ready");

    let scanner = Arc::new(Scanner::new(
        discovery,
        prober,
        device_store.clone(),
        metrics.clone(),
        config.scanner.clone(),
    ));

    let sampler = BandwidthSampler::new(
        Box::new(sentineld::bandwidth::SystemCounters),
        config.bandwidth.ignored_prefixes.clone(),
    );
    let monitor = BandwidthMonitor::new(sampler, metrics_store).with_metrics(metrics.clone());

    let state = AppState {
        monitor: Arc::new(monitor),
        devices: device_store,
        metrics,
        active_window: config.api.active_window(),
    };

    let shutdown = CancellationToken::new();
    let scanner_handle = start_scanner(scanner, shutdown.child_token());
    spawn_signal_handler(shutdown.clone());

    let addr = config.api.socket_addr()?;
    info!(%addr, "sentineld: Serving HTTP API");
    let served = sentineld::serve(addr, state, shutdown.clone()).await;

    // Also stops the scanner when the server failed on its own
    shutdown.cancel();
    if let Err(e) = scanner_handle.await {
        warn!(error = %e, "sentineld: Scanner task ended abnormally");
    }

    served.context("HTTP server failed")?;
    info!("sentineld: Graceful shutdown complete");
    Ok(())
}

/// Cancel `shutdown` on Ctrl-C
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("sentineld: Received SIGINT");
            shutdown.cancel();
        }
    });
}
