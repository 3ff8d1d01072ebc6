#![forbid(unsafe_code)]

//! `session-harness`: brings up a display-server session.
//!
//! Starts the server, discovers the endpoint it creates, waits on the
//! barrier process and starts the clients. Prints `KEY=endpoint` on stdout
//! once the session is up. Without `--attach` the session keeps running
//! after the harness exits.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use session_harness::launcher::SessionLauncher;
use session_harness::logging::{init_tracing, LogFormat};
use session_harness::signals::interrupt_signal;
use session_harness::{AppError, HarnessConfig, Result};

#[derive(Debug, Parser)]
#[command(name = "session-harness", about = "Display-server session launcher", version, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Stay in the foreground and stop the session on Ctrl-C.
    #[arg(long)]
    attach: bool,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("session-harness: {err}");
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
            error!(%err, "session launch failed");
            eprintln!("session-harness: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(args: &Cli) -> Result<()> {
    let config = HarnessConfig::load(args.config.as_deref())?;
    info!(runtime_dir = %config.runtime_dir.display(), "configuration loaded");

    let env_key = config.launch.env_key.clone();
    let grace = config.launch.shutdown_grace();
    let launcher = SessionLauncher::new(config)?;
    let mut session = launcher.launch().await?;

    writeln!(std::io::stdout().lock(), "{env_key}={}", session.endpoint)
        .map_err(|err| AppError::Io(format!("failed to write endpoint to stdout: {err}")))?;

    if args.attach {
        info!("attached; press ctrl-c to stop the session");
        interrupt_signal().await;
        info!("shutdown signal received");
        session.shutdown(grace).await;
    }

    Ok(())
}
