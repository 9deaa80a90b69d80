//! Corsac server implementation: framed binary TCP protocol over the
//! storage engine.

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod server;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use protocol::{Message, MessageType, HEADER_SIZE, MAX_MESSAGE_SIZE};
pub use server::{Server, StopHandle};
