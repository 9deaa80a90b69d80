//! Wire codec for the request/response protocol.
//!
//! On the wire every message is framed by a `len:u32 LE` prefix, followed by
//! a 13-byte header `type:u8 | id:u32 LE | key_length:u32 LE |
//! value_length:u32 LE` and then the key and value bytes. Frames are capped
//! at 1 MiB. Responses echo the request's `id`.

use std::convert::TryFrom;

use corsac_core::{MAX_KEY_SIZE, MAX_VALUE_SIZE};

use crate::error::{Result, ServerError};

/// Fixed message header size (bytes), excluding the frame length prefix.
pub const HEADER_SIZE: usize = 1 + 4 + 4 + 4;

/// Maximum frame size (1 MiB). Longer frames terminate the connection.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Protocol message type.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Read a key.
    Get = 1,
    /// Write a key.
    Put = 2,
    /// Remove a key.
    Delete = 3,
    /// Range scan; `key` is the start bound, `value` the end bound.
    Scan = 4,
    /// Health check.
    Ping = 5,
    /// Health check response.
    Pong = 6,
    /// Failure response; `value` carries the reason.
    Error = 7,
    /// Success response; `value` carries the payload.
    Success = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = ServerError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Get),
            2 => Ok(Self::Put),
            3 => Ok(Self::Delete),
            4 => Ok(Self::Scan),
            5 => Ok(Self::Ping),
            6 => Ok(Self::Pong),
            7 => Ok(Self::Error),
            8 => Ok(Self::Success),
            other => Err(ServerError::UnsupportedOperation(other)),
        }
    }
}

/// A decoded protocol message.
///
/// The type is kept as the raw wire byte: unknown values decode as-is and
/// are rejected at dispatch, not in the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Raw message type byte.
    pub message_type: u8,
    /// Request id; responses echo it.
    pub id: u32,
    /// Key bytes.
    pub key: Vec<u8>,
    /// Value bytes.
    pub value: Vec<u8>,
}

impl Message {
    /// Build a request of the given type.
    pub fn request(message_type: MessageType, id: u32, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            message_type: message_type as u8,
            id,
            key,
            value,
        }
    }

    /// Build a `SUCCESS` response carrying `value`.
    pub fn success(id: u32, value: Vec<u8>) -> Self {
        Self::request(MessageType::Success, id, Vec::new(), value)
    }

    /// Build an `ERROR` response carrying a human-readable reason.
    pub fn error(id: u32, reason: &str) -> Self {
        Self::request(MessageType::Error, id, Vec::new(), reason.as_bytes().to_vec())
    }

    /// Build the `PONG` health-check response.
    pub fn pong(id: u32) -> Self {
        Self::request(MessageType::Pong, id, Vec::new(), b"PONG".to_vec())
    }

    /// The message type, or `UnsupportedOperation` for a byte outside the
    /// enumerated set.
    pub fn message_type(&self) -> Result<MessageType> {
        MessageType::try_from(self.message_type)
    }

    /// Serialized length, excluding the frame prefix.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.key.len() + self.value.len()
    }

    /// Encode the message. Length fields are taken from the payloads, so
    /// encoding is total for any in-memory message.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(self.message_type);
        out.extend_from_slice(&self.id.to_le_bytes());
        out.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.key);
        out.extend_from_slice(&self.value);
        out
    }

    /// Decode one message from a frame body.
    ///
    /// Fails with `MalformedFrame` when the buffer is shorter than the fixed
    /// header or than the declared payload lengths, and with
    /// `OversizedField` when a length field exceeds the key or value bound.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(ServerError::MalformedFrame(format!(
                "frame too short: {} bytes, header needs {HEADER_SIZE}",
                buf.len()
            )));
        }

        let message_type = buf[0];
        let id = u32::from_le_bytes(buf[1..5].try_into().expect("fixed slice length"));
        let key_length =
            u32::from_le_bytes(buf[5..9].try_into().expect("fixed slice length")) as usize;
        let value_length =
            u32::from_le_bytes(buf[9..13].try_into().expect("fixed slice length")) as usize;

        if key_length > MAX_KEY_SIZE {
            return Err(ServerError::OversizedField(format!(
                "key of {key_length} bytes exceeds {MAX_KEY_SIZE}"
            )));
        }
        if value_length > MAX_VALUE_SIZE {
            return Err(ServerError::OversizedField(format!(
                "value of {value_length} bytes exceeds {MAX_VALUE_SIZE}"
            )));
        }

        let total = HEADER_SIZE + key_length + value_length;
        if buf.len() < total {
            return Err(ServerError::MalformedFrame(format!(
                "frame declares {total} bytes, got {}",
                buf.len()
            )));
        }

        let key = buf[HEADER_SIZE..HEADER_SIZE + key_length].to_vec();
        let value = buf[HEADER_SIZE + key_length..total].to_vec();

        Ok(Self {
            message_type,
            id,
            key,
            value,
        })
    }
}
