//! Corsac server binary.
//!
//! `corsac-server [port]` — binds the configured TCP port (default 8080),
//! recovers the engine from its write-ahead log and serves until SIGINT or
//! SIGTERM. Exits 0 on clean shutdown, 1 on startup failure.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use corsac_core::Database;
use corsac_server::{Result, Server, ServerConfig, StopHandle};

#[derive(Debug, Parser)]
#[command(name = "corsac-server", version, about = "Corsac key-value store server")]
struct Cli {
    /// TCP port to listen on; overrides the config file.
    port: Option<u16>,

    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory; overrides the config file.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("corsac-server: {err}");
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("corsac-server: failed to build runtime: {err}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("corsac-server: {err}");
            ExitCode::from(1)
        }
    }
}

fn load_config(cli: &Cli) -> Result<ServerConfig> {
    let mut config = ServerConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(config: ServerConfig) -> Result<()> {
    let (db, recovery) = Database::initialize(&config.data_dir)?;
    tracing::info!(
        records = recovery.records_replayed,
        keys = recovery.keys_loaded,
        data_dir = %config.data_dir.display(),
        "engine recovered"
    );

    let db = Arc::new(db);
    let mut server = Server::bind(config, Arc::clone(&db)).await?;

    let stop = server.stop_handle();
    tokio::spawn(stop_on_signal(stop));

    server.run().await?;

    db.shutdown()?;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn stop_on_signal(stop: StopHandle) {
    #[cfg(unix)]
    {
        let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(signal) => signal,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                stop.stop();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("shutdown signal received");
    stop.stop();
}
