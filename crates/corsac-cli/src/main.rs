//! Corsac CLI - command-line client for a running Corsac server.

mod client;
mod error;

use std::io;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use client::Client;
use error::Result;

#[derive(Debug, Parser)]
#[command(name = "corsac", version, about = "Corsac key-value store client")]
struct Cli {
    /// Server host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Get the value for a key.
    Get { key: String },
    /// Put a key-value pair.
    Put { key: String, value: String },
    /// Delete a key.
    Del { key: String },
    /// Scan keys in the half-open range [start, end).
    Scan { start: String, end: String },
    /// Ping the server.
    Ping,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::from(1)
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut client = Client::connect(&cli.host, cli.port).await?;

    match cli.command {
        Command::Get { key } => {
            let value = client.get(key.as_bytes()).await?;
            println!("{}", String::from_utf8_lossy(&value));
        }
        Command::Put { key, value } => {
            client.put(key.as_bytes(), value.as_bytes()).await?;
            println!("OK");
        }
        Command::Del { key } => {
            client.delete(key.as_bytes()).await?;
            println!("OK");
        }
        Command::Scan { start, end } => {
            for (key, value) in client.scan(start.as_bytes(), end.as_bytes()).await? {
                println!("{key}\t{value}");
            }
        }
        Command::Ping => {
            if client.ping().await? {
                println!("PONG");
            } else {
                println!("ERROR");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::parse_from(["corsac", "put", "user:1", "Alice"]);
        assert!(matches!(cli.command, Command::Put { .. }));
        assert_eq!(cli.host, "127.0.0.1");
        assert_eq!(cli.port, 8080);

        let cli = Cli::parse_from(["corsac", "--port", "9000", "scan", "a", "z"]);
        assert!(matches!(cli.command, Command::Scan { .. }));
        assert_eq!(cli.port, 9000);
    }
}
