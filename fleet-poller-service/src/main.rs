//! Fleet Poller Service
//!
//! Binary wrapper around the fleet-poller library. It loads configuration,
//! starts the polling coordinator against the vendor API, and serves the
//! read API (status, vehicles, per-vehicle history) over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use fleet_poller::{PollCoordinator, TelemetryClient};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

mod config;
mod http;
mod publish;

/// How long a stopping poller may finish an in-flight fetch
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Fleet Poller - poll a vehicle telemetry API and serve the current state
#[derive(Parser, Debug)]
#[command(name = "fleet-poller-service")]
#[command(about = "Poll a vehicle telemetry API and expose vehicle state over HTTP", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run a single poll cycle, print the snapshot as JSON, and exit
    #[arg(long)]
    once: bool,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = config::load_config(args.config.as_deref())?;
    init_logging(args.verbose, args.quiet, config.debug);

    log::info!("Fleet Poller Service v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using poller library v{}", fleet_poller::VERSION);

    let poller_config = config.poller_config();
    let client = TelemetryClient::new(
        config.api.base_url.as_str(),
        config.api.api_key.as_str(),
        config.api.user_key.clone(),
        poller_config.fetch_timeout(),
    )?;
    let coordinator = PollCoordinator::new(
        Arc::new(client),
        Arc::new(publish::LogPublisher),
        poller_config,
    )?;

    if args.once {
        return run_once(&coordinator).await;
    }

    let handle = coordinator.start();

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind read API to {}", config.server.bind))?;
    log::info!("read API listening on {}", config.server.bind);

    axum::serve(listener, http::router(coordinator))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("shutdown requested");
        })
        .await
        .context("read API server failed")?;

    handle.stop(SHUTDOWN_GRACE).await;
    Ok(())
}

/// Single-cycle mode: poll once and print the snapshot
async fn run_once(coordinator: &Arc<PollCoordinator>) -> Result<()> {
    let outcome = coordinator.run_once().await;
    log::info!("single poll cycle finished: {outcome:?}");

    let snapshot = coordinator.snapshot();
    let rendered = serde_json::to_string_pretty(snapshot.as_ref())
        .context("Failed to render snapshot as JSON")?;
    println!("{rendered}");

    let health = coordinator.health();
    if let Some(error) = health.last_error {
        anyhow::bail!("poll cycle failed: {error}");
    }
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool, debug: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose.max(u8::from(debug)) {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
