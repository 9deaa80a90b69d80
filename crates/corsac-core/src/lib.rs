//! The core crate for Corsac, providing the durable storage engine.
//!
//! The engine is an in-memory ordered map guarded by a reader/writer lock,
//! made durable by a write-ahead log: every mutation is appended to the log
//! and flushed before it becomes visible in the map, and startup rebuilds
//! the map by replaying the log in append order.

#![deny(missing_docs)]

pub mod db;
pub mod error;
pub mod store;
pub mod txn;
pub mod types;
pub mod wal;

pub use db::{Database, RecoveryReport};
pub use error::{Error, Result};
pub use store::KvStore;
pub use txn::Transaction;
pub use types::{Key, TxnState, Value, MAX_KEY_SIZE, MAX_VALUE_SIZE};
pub use wal::record::{RecordType, WalRecord};
pub use wal::WriteAheadLog;
