//! The database engine: lifecycle, recovery, transaction factory and
//! maintenance operations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::store::KvStore;
use crate::txn::Transaction;
use crate::wal::record::RecordType;
use crate::wal::WriteAheadLog;

/// What `initialize` rebuilt from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records replayed from the WAL, in append order.
    pub records_replayed: usize,
    /// Keys present in the store after replay.
    pub keys_loaded: usize,
}

/// The storage engine. Owns the store and the WAL; hands out transactions.
pub struct Database {
    data_dir: PathBuf,
    store: Arc<KvStore>,
    wal: Arc<WriteAheadLog>,
    initialized: AtomicBool,
    next_txn_id: AtomicU64,
}

impl Database {
    /// Open the engine rooted at `data_dir`: create `<data_dir>/wal/`, open
    /// the log and replay it in full into a fresh store.
    ///
    /// Replay applies `Put` and `Delete` records in append order; `Commit`
    /// and `Checkpoint` records are no-ops. Any I/O failure here is fatal to
    /// startup.
    pub fn initialize(data_dir: &Path) -> Result<(Self, RecoveryReport)> {
        let wal = Arc::new(WriteAheadLog::open(&data_dir.join("wal"))?);
        let store = Arc::new(KvStore::new());

        let records = wal.read_all()?;
        let mut max_txn_id = 0;
        {
            let mut map = store.write();
            for record in &records {
                max_txn_id = max_txn_id.max(record.transaction_id);
                match record.record_type {
                    RecordType::Put => {
                        map.insert(record.key.clone(), record.value.clone());
                    }
                    RecordType::Delete => {
                        map.remove(&record.key);
                    }
                    RecordType::Commit | RecordType::Checkpoint => {}
                }
            }
        }

        let report = RecoveryReport {
            records_replayed: records.len(),
            keys_loaded: store.len(),
        };
        let db = Self {
            data_dir: data_dir.to_path_buf(),
            store,
            wal,
            initialized: AtomicBool::new(true),
            next_txn_id: AtomicU64::new(max_txn_id + 1),
        };
        Ok((db, report))
    }

    /// Write the shutdown checkpoint, force durability and mark the engine
    /// uninitialized. Subsequent `begin_transaction` calls fail.
    pub fn shutdown(&self) -> Result<()> {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let label = self.data_dir.join("checkpoint.db");
        self.wal.create_checkpoint(&label.to_string_lossy())?;
        self.wal.flush()
    }

    /// Hand out a new transaction bound to the store and the WAL.
    pub fn begin_transaction(&self) -> Result<Transaction> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(Error::NotInitialized);
        }
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        Ok(Transaction::new(
            id,
            Arc::clone(&self.store),
            Arc::clone(&self.wal),
        ))
    }

    /// Diagnostic snapshot: store size, directory, lifecycle flag, next
    /// transaction id and the `wal_`-prefixed log counters.
    pub fn stats(&self) -> HashMap<String, String> {
        let mut stats = HashMap::new();
        stats.insert("total_keys".into(), self.store.len().to_string());
        stats.insert(
            "data_directory".into(),
            self.data_dir.to_string_lossy().into_owned(),
        );
        stats.insert(
            "initialized".into(),
            self.initialized.load(Ordering::SeqCst).to_string(),
        );
        stats.insert(
            "next_transaction_id".into(),
            self.next_txn_id.load(Ordering::SeqCst).to_string(),
        );

        let wal_stats = self.wal.stats();
        stats.insert(
            "wal_log_directory".into(),
            wal_stats.log_dir.to_string_lossy().into_owned(),
        );
        stats.insert(
            "wal_current_log_file".into(),
            wal_stats.current_log_file.to_string_lossy().into_owned(),
        );
        stats.insert(
            "wal_total_records".into(),
            wal_stats.record_count.to_string(),
        );
        stats.insert("wal_total_bytes".into(), wal_stats.byte_count.to_string());
        stats
    }

    /// Rotate the WAL to a fresh file. In-memory data is untouched.
    pub fn compact(&self) -> Result<()> {
        self.wal.truncate()
    }

    /// Append a checkpoint record labelled `path`.
    pub fn backup(&self, path: &str) -> Result<()> {
        self.wal.create_checkpoint(path)
    }

    /// Re-apply the records recorded after the last checkpoint labelled
    /// `path` onto the live store, returning how many were applied. The
    /// store is not cleared first; this is an advisory replay.
    pub fn restore(&self, path: &str) -> Result<usize> {
        let records = self.wal.recover_from_checkpoint(path)?;
        let mut map = self.store.write();
        for record in &records {
            match record.record_type {
                RecordType::Put => {
                    map.insert(record.key.clone(), record.value.clone());
                }
                RecordType::Delete => {
                    map.remove(&record.key);
                }
                RecordType::Commit | RecordType::Checkpoint => {}
            }
        }
        Ok(records.len())
    }

    /// The store this engine serves.
    pub fn store(&self) -> &Arc<KvStore> {
        &self.store
    }

    /// Direct access to the WAL, for maintenance tooling.
    pub fn wal(&self) -> &Arc<WriteAheadLog> {
        &self.wal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxnState;
    use tempfile::tempdir;

    #[test]
    fn initialize_on_empty_dir_starts_fresh() {
        let dir = tempdir().unwrap();
        let (db, report) = Database::initialize(dir.path()).unwrap();
        assert_eq!(report.records_replayed, 0);
        assert_eq!(report.keys_loaded, 0);
        assert!(db.store().is_empty());
    }

    #[test]
    fn auto_commit_cycle() {
        let dir = tempdir().unwrap();
        let (db, _) = Database::initialize(dir.path()).unwrap();

        let mut txn = db.begin_transaction().unwrap();
        txn.put(b"user:1".to_vec(), b"Alice".to_vec()).unwrap();
        txn.commit().unwrap();
        assert_eq!(txn.state(), TxnState::Committed);

        let txn = db.begin_transaction().unwrap();
        assert_eq!(txn.get(b"user:1").unwrap(), Some(b"Alice".to_vec()));
    }

    #[test]
    fn transaction_ids_strictly_increase() {
        let dir = tempdir().unwrap();
        let (db, _) = Database::initialize(dir.path()).unwrap();
        let a = db.begin_transaction().unwrap().id();
        let b = db.begin_transaction().unwrap().id();
        let c = db.begin_transaction().unwrap().id();
        assert!(a > 0 && b > a && c > b);
    }

    #[test]
    fn begin_after_shutdown_fails() {
        let dir = tempdir().unwrap();
        let (db, _) = Database::initialize(dir.path()).unwrap();
        db.shutdown().unwrap();
        assert!(matches!(
            db.begin_transaction(),
            Err(Error::NotInitialized)
        ));
    }

    #[test]
    fn restart_replays_committed_mutations() {
        let dir = tempdir().unwrap();
        {
            let (db, _) = Database::initialize(dir.path()).unwrap();
            let mut txn = db.begin_transaction().unwrap();
            txn.put(b"a".to_vec(), b"1".to_vec()).unwrap();
            txn.put(b"b".to_vec(), b"2".to_vec()).unwrap();
            txn.put(b"a".to_vec(), b"3".to_vec()).unwrap();
            txn.delete(b"b").unwrap();
            txn.commit().unwrap();
            db.shutdown().unwrap();
        }

        let (db, report) = Database::initialize(dir.path()).unwrap();
        assert_eq!(report.keys_loaded, 1);
        let txn = db.begin_transaction().unwrap();
        assert_eq!(txn.get(b"a").unwrap(), Some(b"3".to_vec()));
        assert_eq!(txn.get(b"b").unwrap(), None);
    }

    #[test]
    fn transaction_ids_resume_past_replayed_ones() {
        let dir = tempdir().unwrap();
        let last_id;
        {
            let (db, _) = Database::initialize(dir.path()).unwrap();
            let mut txn = db.begin_transaction().unwrap();
            last_id = txn.id();
            txn.put(b"k".to_vec(), b"v".to_vec()).unwrap();
            txn.commit().unwrap();
        }

        let (db, _) = Database::initialize(dir.path()).unwrap();
        assert!(db.begin_transaction().unwrap().id() > last_id);
    }

    #[test]
    fn stats_reflect_engine_state() {
        let dir = tempdir().unwrap();
        let (db, _) = Database::initialize(dir.path()).unwrap();
        let mut txn = db.begin_transaction().unwrap();
        txn.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        txn.commit().unwrap();

        let stats = db.stats();
        assert_eq!(stats["total_keys"], "1");
        assert_eq!(stats["initialized"], "true");
        assert_eq!(stats["wal_total_records"], "2");
        assert!(stats["wal_current_log_file"].contains("wal_"));
    }

    #[test]
    fn compact_rotates_wal_and_keeps_data() {
        let dir = tempdir().unwrap();
        let (db, _) = Database::initialize(dir.path()).unwrap();
        let mut txn = db.begin_transaction().unwrap();
        txn.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        txn.commit().unwrap();

        db.compact().unwrap();
        assert_eq!(db.stats()["wal_total_records"], "0");
        let txn = db.begin_transaction().unwrap();
        assert_eq!(txn.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn backup_then_restore_reapplies_suffix() {
        let dir = tempdir().unwrap();
        let (db, _) = Database::initialize(dir.path()).unwrap();

        let mut txn = db.begin_transaction().unwrap();
        txn.put(b"pre".to_vec(), b"1".to_vec()).unwrap();
        txn.commit().unwrap();

        db.backup("backup-1").unwrap();

        let mut txn = db.begin_transaction().unwrap();
        txn.put(b"post".to_vec(), b"2".to_vec()).unwrap();
        txn.commit().unwrap();

        // Two records after the checkpoint: the put and its commit.
        let applied = db.restore("backup-1").unwrap();
        assert_eq!(applied, 2);
        let txn = db.begin_transaction().unwrap();
        assert_eq!(txn.get(b"post").unwrap(), Some(b"2".to_vec()));
    }
}
