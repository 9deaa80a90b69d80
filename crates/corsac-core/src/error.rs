//! Error and Result types for the Corsac storage core.
use thiserror::Error;

/// A convenience `Result` type.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for storage-core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested key was not found.
    #[error("key not found")]
    KeyNotFound,

    /// The transaction has already terminated (committed or rolled back).
    #[error("transaction is not active")]
    TxnClosed,

    /// The engine has not been initialized or has been shut down.
    #[error("database is not initialized")]
    NotInitialized,

    /// A serialized record or frame violated the on-disk layout.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// An underlying I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
