//! Transactions: the unit through which callers mutate the store.
//!
//! The server wraps every request in its own single-operation transaction
//! (auto-commit). Writes are logged to the WAL and applied in place under the
//! store's exclusive lock, so a `put` or `delete` is visible as soon as it
//! returns; `commit` appends the commit marker. Because writes land in place,
//! `rollback` is a state transition only and does not undo them.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::store::KvStore;
use crate::types::{Key, TxnState, Value};
use crate::wal::record::WalRecord;
use crate::wal::WriteAheadLog;

/// Scan results are capped here when the caller does not say otherwise.
pub const DEFAULT_SCAN_LIMIT: usize = 1000;

/// A short-lived handle over the shared store and WAL.
///
/// Lifecycle: `Active -> (Committed | RolledBack)`. Terminal states are
/// absorbing; every operation on a terminated handle fails with
/// [`Error::TxnClosed`].
pub struct Transaction {
    id: u64,
    state: TxnState,
    store: Arc<KvStore>,
    wal: Arc<WriteAheadLog>,
}

impl Transaction {
    pub(crate) fn new(id: u64, store: Arc<KvStore>, wal: Arc<WriteAheadLog>) -> Self {
        Self {
            id,
            state: TxnState::Active,
            store,
            wal,
        }
    }

    /// The transaction's unique id. Ids are strictly increasing within a
    /// process lifetime; zero is reserved for non-transactional records.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TxnState {
        self.state
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state != TxnState::Active {
            return Err(Error::TxnClosed);
        }
        Ok(())
    }

    /// Read `key` under the shared lock. Reads do not touch the WAL.
    pub fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        self.ensure_active()?;
        Ok(self.store.get(key))
    }

    /// Write `key = value`. The WAL record is appended and flushed inside
    /// the exclusive section, before the map changes; if the append fails
    /// the map is untouched.
    pub fn put(&mut self, key: Key, value: Value) -> Result<()> {
        self.ensure_active()?;
        let mut map = self.store.write();
        self.wal
            .append(WalRecord::put(self.id, key.clone(), value.clone()))?;
        map.insert(key, value);
        Ok(())
    }

    /// Remove `key`. An absent key is [`Error::KeyNotFound`] and writes
    /// nothing to the WAL.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.ensure_active()?;
        let mut map = self.store.write();
        if !map.contains_key(key) {
            return Err(Error::KeyNotFound);
        }
        self.wal.append(WalRecord::delete(self.id, key.to_vec()))?;
        map.remove(key);
        Ok(())
    }

    /// Collect up to `limit` pairs with `start <= key < end`, under the
    /// shared lock.
    pub fn scan(&self, start: &[u8], end: &[u8], limit: usize) -> Result<Vec<(Key, Value)>> {
        self.ensure_active()?;
        Ok(self.store.scan(start, end, limit))
    }

    /// Append the commit marker and transition to `Committed`. On a WAL
    /// failure the state stays `Active` so the caller may retry or roll back.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.wal.append(WalRecord::commit(self.id))?;
        self.state = TxnState::Committed;
        Ok(())
    }

    /// Transition to `RolledBack`. Writes already applied are not undone.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.state = TxnState::RolledBack;
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TxnState::Active {
            self.state = TxnState::RolledBack;
        }
    }
}
