#![forbid(unsafe_code)]

//! `window-churn`: keeps opening and closing client windows at random.
//!
//! Meant to run against an already launched session. Each step resizes the
//! client pool to a random size; Ctrl-C stops every client and exits 0.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use session_harness::churn::{ChurnDriver, ClientPool, ProcessSpawner, ShutdownCoordinator};
use session_harness::logging::{init_tracing, LogFormat};
use session_harness::process::SpawnOptions;
use session_harness::{AppError, HarnessConfig, Result};

#[derive(Debug, Parser)]
#[command(name = "window-churn", about = "Random client churn driver", version, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Seed for reproducible pool sizes; overrides `churn.seed`.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("window-churn: {err}");
        return ExitCode::FAILURE;
    }

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))
        .and_then(|runtime| runtime.block_on(run(&args)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "churn driver failed");
            eprintln!("window-churn: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(args: &Cli) -> Result<()> {
    let mut config = HarnessConfig::load(args.config.as_deref())?;
    if args.seed.is_some() {
        config.churn.seed = args.seed;
    }
    info!(
        min = config.churn.min_clients,
        max = config.churn.max_clients,
        interval_ms = config.churn.interval_ms,
        seed = config.churn.seed,
        "configuration loaded"
    );

    let spawner = ProcessSpawner::new(
        config.churn.client.clone(),
        SpawnOptions {
            stop_signal: config.stop_signal,
            ..SpawnOptions::default()
        },
    );
    let mut driver = ChurnDriver::new(ClientPool::new(spawner), &config.churn);

    let coordinator = ShutdownCoordinator::new();
    let listener = coordinator.install();

    let report = driver.run(coordinator.token()).await;
    listener.abort();

    info!(
        ticks = driver.ticks(),
        signaled = report.signaled,
        exited = report.drain.exited,
        killed = report.drain.killed,
        "window-churn shut down"
    );

    Ok(())
}
