//! Async client for the Corsac wire protocol.
//!
//! One request, one response: each call sends a single frame and waits for
//! the frame that answers it, checking that the response id matches.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use corsac_server::{Message, MessageType, MAX_MESSAGE_SIZE};

use crate::error::{CliError, Result};

/// A connected client.
pub struct Client {
    stream: TcpStream,
    next_id: u32,
}

impl Client {
    /// Connect to `host:port`.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self { stream, next_id: 0 })
    }

    /// Fetch the value for `key`. A missing key surfaces as the server's
    /// `Key not found` error.
    pub async fn get(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        let response = self
            .round_trip(MessageType::Get, key.to_vec(), Vec::new())
            .await?;
        self.expect_success(response).map(|m| m.value)
    }

    /// Store `key = value`.
    pub async fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let response = self
            .round_trip(MessageType::Put, key.to_vec(), value.to_vec())
            .await?;
        self.expect_success(response).map(|_| ())
    }

    /// Remove `key`.
    pub async fn delete(&mut self, key: &[u8]) -> Result<()> {
        let response = self
            .round_trip(MessageType::Delete, key.to_vec(), Vec::new())
            .await?;
        self.expect_success(response).map(|_| ())
    }

    /// Scan `[start, end)`, returning decoded pairs from the JSON payload.
    pub async fn scan(&mut self, start: &[u8], end: &[u8]) -> Result<Vec<(String, String)>> {
        let response = self
            .round_trip(MessageType::Scan, start.to_vec(), end.to_vec())
            .await?;
        let response = self.expect_success(response)?;
        let entries: Vec<serde_json::Value> = serde_json::from_slice(&response.value)
            .map_err(|err| CliError::InvalidResponse(err.to_string()))?;
        entries
            .into_iter()
            .map(|entry| {
                let key = entry["key"]
                    .as_str()
                    .ok_or_else(|| CliError::InvalidResponse("entry without key".into()))?
                    .to_string();
                let value = entry["value"]
                    .as_str()
                    .ok_or_else(|| CliError::InvalidResponse("entry without value".into()))?
                    .to_string();
                Ok((key, value))
            })
            .collect()
    }

    /// Health check; true when the server answers `PONG`.
    pub async fn ping(&mut self) -> Result<bool> {
        let response = self
            .round_trip(MessageType::Ping, Vec::new(), Vec::new())
            .await?;
        Ok(matches!(response.message_type(), Ok(MessageType::Pong)))
    }

    async fn round_trip(
        &mut self,
        message_type: MessageType,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<Message> {
        self.next_id = self.next_id.wrapping_add(1);
        let request = Message::request(message_type, self.next_id, key, value);

        let encoded = request.encode();
        self.stream
            .write_all(&(encoded.len() as u32).to_le_bytes())
            .await?;
        self.stream.write_all(&encoded).await?;

        let mut len_buf = [0u8; 4];
        self.stream.read_exact(&mut len_buf).await?;
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(CliError::InvalidResponse(format!(
                "response frame of {len} bytes exceeds the protocol maximum"
            )));
        }
        let mut body = vec![0u8; len];
        self.stream.read_exact(&mut body).await?;

        let response = Message::decode(&body).map_err(CliError::Protocol)?;
        if response.id != request.id {
            return Err(CliError::InvalidResponse(format!(
                "response id {} does not match request id {}",
                response.id, request.id
            )));
        }
        Ok(response)
    }

    fn expect_success(&self, response: Message) -> Result<Message> {
        match response.message_type() {
            Ok(MessageType::Success) => Ok(response),
            Ok(MessageType::Error) => Err(CliError::Server(
                String::from_utf8_lossy(&response.value).into_owned(),
            )),
            _ => Err(CliError::InvalidResponse(format!(
                "unexpected response type {}",
                response.message_type
            ))),
        }
    }
}
