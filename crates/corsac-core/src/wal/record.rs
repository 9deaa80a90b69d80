//! On-disk WAL record layout.
//!
//! A record is a 25-byte fixed header followed by the key and value bytes:
//! `type:u8 | timestamp:u64 LE | transaction_id:u64 LE | key_length:u32 LE |
//! value_length:u32 LE | key | value`. In the log file each record is framed
//! by a `u32 LE` length prefix of the serialized record.

use std::convert::TryFrom;

use crate::error::{Error, Result};
use crate::types::{Key, Value, MAX_VALUE_SIZE};

/// Fixed record header size (bytes).
pub const RECORD_HEADER_SIZE: usize = 1 + 8 + 8 + 4 + 4;

/// WAL record type.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    /// Key written with a value.
    Put = 1,
    /// Key removed.
    Delete = 2,
    /// Transaction commit marker.
    Commit = 3,
    /// Recovery root marker; the key carries the checkpoint label.
    Checkpoint = 4,
}

impl TryFrom<u8> for RecordType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Put),
            2 => Ok(Self::Delete),
            3 => Ok(Self::Commit),
            4 => Ok(Self::Checkpoint),
            other => Err(Error::InvalidFormat(format!(
                "unknown WAL record type: {other}"
            ))),
        }
    }
}

/// A single write-ahead log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// Record type.
    pub record_type: RecordType,
    /// Wall-clock milliseconds since the epoch; assigned on append when zero.
    pub timestamp: u64,
    /// Owning transaction id; zero for non-transactional records.
    pub transaction_id: u64,
    /// Key bytes (checkpoint label for `Checkpoint` records).
    pub key: Key,
    /// Value bytes; empty for `Delete`, `Commit` and `Checkpoint`.
    pub value: Value,
}

impl WalRecord {
    /// Construct a `Put` record.
    pub fn put(transaction_id: u64, key: Key, value: Value) -> Self {
        Self {
            record_type: RecordType::Put,
            timestamp: 0,
            transaction_id,
            key,
            value,
        }
    }

    /// Construct a `Delete` record.
    pub fn delete(transaction_id: u64, key: Key) -> Self {
        Self {
            record_type: RecordType::Delete,
            timestamp: 0,
            transaction_id,
            key,
            value: Vec::new(),
        }
    }

    /// Construct a `Commit` marker.
    pub fn commit(transaction_id: u64) -> Self {
        Self {
            record_type: RecordType::Commit,
            timestamp: 0,
            transaction_id,
            key: Vec::new(),
            value: Vec::new(),
        }
    }

    /// Construct a `Checkpoint` marker carrying `label` in the key field.
    pub fn checkpoint(label: &str) -> Self {
        Self {
            record_type: RecordType::Checkpoint,
            timestamp: 0,
            transaction_id: 0,
            key: label.as_bytes().to_vec(),
            value: Vec::new(),
        }
    }

    /// Serialized length including the fixed header.
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_SIZE + self.key.len() + self.value.len()
    }

    /// Encode the record to bytes. Length fields are taken from the payloads.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(self.record_type as u8);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.transaction_id.to_le_bytes());
        out.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.key);
        out.extend_from_slice(&self.value);
        out
    }

    /// Decode a record from one framed chunk. The chunk must contain exactly
    /// one record; declared lengths that disagree with the buffer fail.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < RECORD_HEADER_SIZE {
            return Err(Error::InvalidFormat(
                "buffer too small for WAL record header".into(),
            ));
        }

        let record_type = RecordType::try_from(buf[0])?;
        let timestamp = u64::from_le_bytes(buf[1..9].try_into().expect("fixed slice length"));
        let transaction_id =
            u64::from_le_bytes(buf[9..17].try_into().expect("fixed slice length"));
        let key_length =
            u32::from_le_bytes(buf[17..21].try_into().expect("fixed slice length")) as usize;
        let value_length =
            u32::from_le_bytes(buf[21..25].try_into().expect("fixed slice length")) as usize;

        if value_length > MAX_VALUE_SIZE {
            return Err(Error::InvalidFormat(format!(
                "WAL record value too large: {value_length} bytes"
            )));
        }
        if value_length != 0
            && matches!(
                record_type,
                RecordType::Delete | RecordType::Commit | RecordType::Checkpoint
            )
        {
            return Err(Error::InvalidFormat(format!(
                "{record_type:?} record must have zero-length value"
            )));
        }

        let total = RECORD_HEADER_SIZE
            .checked_add(key_length)
            .and_then(|n| n.checked_add(value_length))
            .ok_or_else(|| Error::InvalidFormat("WAL record lengths overflow".into()))?;
        if buf.len() != total {
            return Err(Error::InvalidFormat(format!(
                "WAL record length mismatch: declared {total}, framed {}",
                buf.len()
            )));
        }

        let key = buf[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + key_length].to_vec();
        let value = buf[RECORD_HEADER_SIZE + key_length..total].to_vec();

        Ok(Self {
            record_type,
            timestamp,
            transaction_id,
            key,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_roundtrip() {
        let mut record = WalRecord::put(7, b"key".to_vec(), b"value".to_vec());
        record.timestamp = 1_700_000_000_123;
        let encoded = record.encode();
        assert_eq!(encoded.len(), record.encoded_len());
        let decoded = WalRecord::decode(&encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn delete_roundtrip() {
        let record = WalRecord::delete(3, b"gone".to_vec());
        let decoded = WalRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded, record);
        assert!(decoded.value.is_empty());
    }

    #[test]
    fn commit_carries_transaction_id() {
        let record = WalRecord::commit(42);
        let decoded = WalRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded.transaction_id, 42);
        assert_eq!(decoded.record_type, RecordType::Commit);
    }

    #[test]
    fn checkpoint_label_rides_in_key() {
        let record = WalRecord::checkpoint("/data/checkpoint.db");
        let decoded = WalRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded.key, b"/data/checkpoint.db".to_vec());
        assert_eq!(decoded.transaction_id, 0);
    }

    #[test]
    fn timestamp_preserved_byte_exact() {
        let mut record = WalRecord::put(1, b"k".to_vec(), b"v".to_vec());
        record.timestamp = u64::MAX - 1;
        let decoded = WalRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded.timestamp, u64::MAX - 1);
    }

    #[test]
    fn short_buffer_rejected() {
        let encoded = WalRecord::commit(1).encode();
        let err = WalRecord::decode(&encoded[..10]).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn truncated_payload_rejected() {
        let record = WalRecord::put(1, b"key".to_vec(), b"value".to_vec());
        let encoded = record.encode();
        let err = WalRecord::decode(&encoded[..encoded.len() - 2]).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn unknown_type_rejected() {
        let mut encoded = WalRecord::commit(1).encode();
        encoded[0] = 0x7F;
        let err = WalRecord::decode(&encoded).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn nonzero_value_on_delete_rejected() {
        let mut record = WalRecord::delete(1, b"k".to_vec());
        record.value = b"junk".to_vec();
        let err = WalRecord::decode(&record.encode()).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn empty_value_put_roundtrip() {
        let record = WalRecord::put(9, b"k".to_vec(), Vec::new());
        let decoded = WalRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded.value.len(), 0);
        assert_eq!(decoded.record_type, RecordType::Put);
    }
}
