/// Server-wide result type.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Top-level error type for corsac-server.
///
/// Frame-level errors (`MalformedFrame`, `OversizedField`) are fatal to the
/// connection and never produce a response; engine errors are converted to
/// protocol `ERROR` responses by the connection handler.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("oversized field: {0}")]
    OversizedField(String),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(u8),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("core error: {0}")]
    Core(#[from] corsac_core::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
