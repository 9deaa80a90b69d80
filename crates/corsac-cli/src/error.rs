//! Error types for the CLI client.

use thiserror::Error;

/// CLI result type.
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors surfaced to the terminal.
#[derive(Debug, Error)]
pub enum CliError {
    /// Connection or socket failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The response frame could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(corsac_server::ServerError),

    /// The server answered with an `ERROR` response.
    #[error("{0}")]
    Server(String),

    /// The server answered with something the client cannot interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
