//! Common types and limits shared across the storage core.

/// A key is an opaque byte string, at most [`MAX_KEY_SIZE`] bytes.
pub type Key = Vec<u8>;

/// A value is an opaque byte string, at most [`MAX_VALUE_SIZE`] bytes.
pub type Value = Vec<u8>;

/// Maximum key size in bytes.
pub const MAX_KEY_SIZE: usize = 256;

/// Maximum value size in bytes (1 MiB).
pub const MAX_VALUE_SIZE: usize = 1024 * 1024;

/// Lifecycle state of a transaction. Terminal states are absorbing: a
/// handle that has committed or rolled back refuses further operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// The transaction accepts operations.
    Active,
    /// The transaction committed; no further operations are accepted.
    Committed,
    /// The transaction rolled back; no further operations are accepted.
    RolledBack,
}
