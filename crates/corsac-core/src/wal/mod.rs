//! Append-only write-ahead log with replay, checkpointing and truncation.
//!
//! The log is a directory of `wal_<unix_ms>.log` files; only the newest file
//! is written. Each file is a concatenation of `len:u32 LE || record` frames
//! (see [`record`]). All operations are serialized by one internal mutex, so
//! the order of frames in the file equals the order in which `append` calls
//! returned, and `read_all` never races an append.

pub mod record;

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;
use crate::types::MAX_VALUE_SIZE;
use record::{RecordType, WalRecord};

/// Frames whose declared length exceeds this terminate a replay scan.
pub const MAX_RECORD_SIZE: usize = MAX_VALUE_SIZE;

/// Diagnostic counters for the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalStats {
    /// Directory holding the log files.
    pub log_dir: PathBuf,
    /// Path of the file currently being appended to.
    pub current_log_file: PathBuf,
    /// Records appended to the current file.
    pub record_count: u64,
    /// Serialized record bytes appended to the current file (without frame
    /// prefixes).
    pub byte_count: u64,
}

struct WalInner {
    writer: BufWriter<File>,
    path: PathBuf,
    record_count: u64,
    byte_count: u64,
}

/// A durable, append-only stream of [`WalRecord`]s.
pub struct WriteAheadLog {
    dir: PathBuf,
    inner: Mutex<WalInner>,
}

impl WriteAheadLog {
    /// Open the log in `dir`, creating the directory if needed.
    ///
    /// Appends resume on the newest `wal_<unix_ms>.log` file so a restart
    /// replays everything written since the last truncation; a fresh
    /// timestamp-named file is created when none exists. A crash-torn tail
    /// on the resumed file is trimmed so later appends land on a clean
    /// frame boundary.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let inner = match newest_log_file(dir)? {
            Some(path) => WalInner::open_existing(path)?,
            None => WalInner::open_new(dir)?,
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            inner: Mutex::new(inner),
        })
    }

    /// Append one record and flush it to the OS before returning.
    ///
    /// A zero timestamp is replaced with the current wall clock. On error the
    /// file may hold a torn frame; the caller must not apply the mutation.
    pub fn append(&self, mut record: WalRecord) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if record.timestamp == 0 {
            record.timestamp = now_ms();
        }

        let encoded = record.encode();
        inner
            .writer
            .write_all(&(encoded.len() as u32).to_le_bytes())?;
        inner.writer.write_all(&encoded)?;
        inner.writer.flush()?;

        inner.record_count += 1;
        inner.byte_count += encoded.len() as u64;
        Ok(())
    }

    /// Read every record in the current file, in append order.
    ///
    /// The scan stops quietly at EOF, at a frame whose declared length
    /// exceeds [`MAX_RECORD_SIZE`], at a short (torn) frame, or at the first
    /// record that fails to decode. A crash-torn tail is therefore dropped
    /// rather than reported.
    pub fn read_all(&self) -> Result<Vec<WalRecord>> {
        let mut inner = self.inner.lock().unwrap();
        inner.writer.flush()?;

        let mut file = File::open(&inner.path)?;
        let mut records = Vec::new();
        loop {
            let mut len_buf = [0u8; 4];
            match file.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_RECORD_SIZE {
                break;
            }

            let mut buf = vec![0u8; len];
            match file.read_exact(&mut buf) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err.into()),
            }

            match WalRecord::decode(&buf) {
                Ok(record) => records.push(record),
                Err(_) => break,
            }
        }
        Ok(records)
    }

    /// Append a `Checkpoint` record carrying `label` and flush it.
    pub fn create_checkpoint(&self, label: &str) -> Result<()> {
        self.append(WalRecord::checkpoint(label))?;
        self.flush()
    }

    /// Return the records logically rooted at the last `Checkpoint` matching
    /// `label`: everything after it, or every record when no checkpoint
    /// matches. `Checkpoint` records themselves are skipped.
    pub fn recover_from_checkpoint(&self, label: &str) -> Result<Vec<WalRecord>> {
        let records = self.read_all()?;
        let root = records
            .iter()
            .rposition(|r| r.record_type == RecordType::Checkpoint && r.key == label.as_bytes());
        let start = root.map(|idx| idx + 1).unwrap_or(0);
        Ok(records[start..]
            .iter()
            .filter(|r| r.record_type != RecordType::Checkpoint)
            .cloned()
            .collect())
    }

    /// Rotate to a fresh timestamp-named log file and reset the counters.
    /// The previous file is left on disk.
    pub fn truncate(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.writer.flush()?;
        *inner = WalInner::open_new(&self.dir)?;
        Ok(())
    }

    /// Force on-disk durability of everything appended so far.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.writer.flush()?;
        inner.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Current diagnostic counters.
    pub fn stats(&self) -> WalStats {
        let inner = self.inner.lock().unwrap();
        WalStats {
            log_dir: self.dir.clone(),
            current_log_file: inner.path.clone(),
            record_count: inner.record_count,
            byte_count: inner.byte_count,
        }
    }

    /// Path of the file currently being appended to.
    pub fn current_log_file(&self) -> PathBuf {
        self.inner.lock().unwrap().path.clone()
    }
}

impl WalInner {
    fn open_new(dir: &Path) -> Result<Self> {
        let mut ts = now_ms();
        let mut path = dir.join(format!("wal_{ts}.log"));
        // Two rotations inside one millisecond must not share a file, or the
        // new generation would replay the old one's records.
        while path.exists() {
            ts += 1;
            path = dir.join(format!("wal_{ts}.log"));
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            record_count: 0,
            byte_count: 0,
        })
    }

    fn open_existing(path: PathBuf) -> Result<Self> {
        let (record_count, byte_count, valid_len) = scan_file(&path)?;
        let file = OpenOptions::new().append(true).open(&path)?;
        if file.metadata()?.len() > valid_len {
            file.set_len(valid_len)?;
        }
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            record_count,
            byte_count,
        })
    }
}

/// Newest `wal_<unix_ms>.log` in `dir`, by embedded timestamp.
fn newest_log_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut newest: Option<(u64, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let ts = name
            .to_string_lossy()
            .strip_prefix("wal_")
            .and_then(|s| s.strip_suffix(".log"))
            .and_then(|s| s.parse::<u64>().ok());
        if let Some(ts) = ts {
            if newest.as_ref().map_or(true, |(best, _)| ts > *best) {
                newest = Some((ts, entry.path()));
            }
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Count the decodable records of a log file with the same tolerant scan as
/// `read_all`, returning `(records, record_bytes, valid_prefix_len)`.
fn scan_file(path: &Path) -> Result<(u64, u64, u64)> {
    let mut file = File::open(path)?;
    let mut record_count = 0u64;
    let mut byte_count = 0u64;
    let mut valid_len = 0u64;
    loop {
        let mut len_buf = [0u8; 4];
        match file.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_RECORD_SIZE {
            break;
        }
        let mut buf = vec![0u8; len];
        match file.read_exact(&mut buf) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        }
        if WalRecord::decode(&buf).is_err() {
            break;
        }
        record_count += 1;
        byte_count += len as u64;
        valid_len += 4 + len as u64;
    }
    Ok((record_count, byte_count, valid_len))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
