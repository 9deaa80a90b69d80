//! Crash-recovery scenarios exercised through the public engine API.

use std::fs::OpenOptions;
use std::io::Write;

use corsac_core::{Database, Result};
use tempfile::tempdir;

fn apply(db: &Database, ops: &[(&[u8], Option<&[u8]>)]) -> Result<()> {
    for (key, value) in ops {
        let mut txn = db.begin_transaction()?;
        match value {
            Some(v) => txn.put(key.to_vec(), v.to_vec())?,
            None => txn.delete(key)?,
        }
        txn.commit()?;
    }
    Ok(())
}

#[test]
fn clean_shutdown_recovers_latest_state() -> Result<()> {
    let dir = tempdir()?;
    {
        let (db, _) = Database::initialize(dir.path())?;
        apply(
            &db,
            &[
                (b"a", Some(b"1")),
                (b"b", Some(b"2")),
                (b"a", Some(b"3")),
                (b"b", None),
            ],
        )?;
        db.shutdown()?;
    }

    let (db, report) = Database::initialize(dir.path())?;
    assert_eq!(report.keys_loaded, 1);
    let txn = db.begin_transaction()?;
    assert_eq!(txn.get(b"a")?, Some(b"3".to_vec()));
    assert_eq!(txn.get(b"b")?, None);
    Ok(())
}

#[test]
fn abrupt_stop_recovers_latest_state() -> Result<()> {
    let dir = tempdir()?;
    {
        let (db, _) = Database::initialize(dir.path())?;
        apply(&db, &[(b"k", Some(b"v1")), (b"k", Some(b"v2"))])?;
        // No shutdown: the engine is simply dropped, as a crash would.
    }

    let (db, _) = Database::initialize(dir.path())?;
    let txn = db.begin_transaction()?;
    assert_eq!(txn.get(b"k")?, Some(b"v2".to_vec()));
    Ok(())
}

#[test]
fn recovery_equals_projection_of_applied_ops() -> Result<()> {
    let dir = tempdir()?;
    let mut expected = std::collections::BTreeMap::new();
    {
        let (db, _) = Database::initialize(dir.path())?;
        for i in 0u32..200 {
            let key = format!("key-{:03}", i % 40).into_bytes();
            if i % 7 == 3 {
                let mut txn = db.begin_transaction()?;
                if txn.delete(&key).is_ok() {
                    expected.remove(&key);
                }
                txn.commit()?;
            } else {
                let value = format!("value-{i}").into_bytes();
                let mut txn = db.begin_transaction()?;
                txn.put(key.clone(), value.clone())?;
                txn.commit()?;
                expected.insert(key, value);
            }
        }
    }

    let (db, report) = Database::initialize(dir.path())?;
    assert_eq!(report.keys_loaded, expected.len());
    let txn = db.begin_transaction()?;
    for (key, value) in &expected {
        assert_eq!(txn.get(key)?.as_ref(), Some(value));
    }
    Ok(())
}

#[test]
fn torn_tail_drops_only_the_torn_record() -> Result<()> {
    let dir = tempdir()?;
    let log_file;
    {
        let (db, _) = Database::initialize(dir.path())?;
        apply(&db, &[(b"kept", Some(b"1")), (b"also-kept", Some(b"2"))])?;
        log_file = db.wal().current_log_file();
    }

    // Simulate a crash mid-append: a frame prefix with half a record behind it.
    let mut file = OpenOptions::new().append(true).open(&log_file)?;
    file.write_all(&200u32.to_le_bytes())?;
    file.write_all(&[0xAB; 17])?;
    file.sync_all()?;

    let (db, report) = Database::initialize(dir.path())?;
    assert_eq!(report.keys_loaded, 2);
    let txn = db.begin_transaction()?;
    assert_eq!(txn.get(b"kept")?, Some(b"1".to_vec()));
    assert_eq!(txn.get(b"also-kept")?, Some(b"2".to_vec()));
    Ok(())
}

#[test]
fn writes_after_torn_tail_survive_the_next_restart() -> Result<()> {
    let dir = tempdir()?;
    let log_file;
    {
        let (db, _) = Database::initialize(dir.path())?;
        apply(&db, &[(b"a", Some(b"1"))])?;
        log_file = db.wal().current_log_file();
    }

    let mut file = OpenOptions::new().append(true).open(&log_file)?;
    file.write_all(&99u32.to_le_bytes())?;
    file.write_all(&[1, 2, 3])?;
    file.sync_all()?;

    {
        let (db, _) = Database::initialize(dir.path())?;
        apply(&db, &[(b"b", Some(b"2"))])?;
    }

    let (db, _) = Database::initialize(dir.path())?;
    let txn = db.begin_transaction()?;
    assert_eq!(txn.get(b"a")?, Some(b"1".to_vec()));
    assert_eq!(txn.get(b"b")?, Some(b"2".to_vec()));
    Ok(())
}

#[test]
fn compact_resets_replay_to_the_new_generation() -> Result<()> {
    let dir = tempdir()?;
    {
        let (db, _) = Database::initialize(dir.path())?;
        apply(&db, &[(b"old", Some(b"1"))])?;
        db.compact()?;
        apply(&db, &[(b"new", Some(b"2"))])?;
    }

    // Only the post-compaction generation is replayed; the checkpoint
    // mechanism stores no snapshot, so pre-compaction keys are gone after a
    // restart. That is the documented cost of `compact`.
    let (db, report) = Database::initialize(dir.path())?;
    assert_eq!(report.keys_loaded, 1);
    let txn = db.begin_transaction()?;
    assert_eq!(txn.get(b"new")?, Some(b"2".to_vec()));
    assert_eq!(txn.get(b"old")?, None);
    Ok(())
}

#[test]
fn shutdown_checkpoint_is_skipped_by_replay() -> Result<()> {
    let dir = tempdir()?;
    {
        let (db, _) = Database::initialize(dir.path())?;
        apply(&db, &[(b"k", Some(b"v"))])?;
        db.shutdown()?;
    }
    {
        let (db, _) = Database::initialize(dir.path())?;
        db.shutdown()?;
    }

    // Two shutdown checkpoints in the log; neither affects the data.
    let (db, _) = Database::initialize(dir.path())?;
    let txn = db.begin_transaction()?;
    assert_eq!(txn.get(b"k")?, Some(b"v".to_vec()));
    Ok(())
}
