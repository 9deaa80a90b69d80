//! Per-connection request loop: read a frame, dispatch it through an
//! auto-commit transaction, write the response frame.
//!
//! The loop is strictly sequential; pipelined requests queue in the socket
//! and are answered in arrival order, so response `id`s always pair up with
//! their requests. Frame-level errors (oversized or malformed frames, I/O
//! failures) terminate the connection without a response.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use corsac_core::{Database, Error};
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::protocol::{Message, MessageType, MAX_MESSAGE_SIZE};

#[derive(Serialize)]
struct ScanEntry {
    key: String,
    value: String,
}

/// One accepted client connection.
pub struct Connection {
    stream: TcpStream,
    db: Arc<Database>,
    total_requests: Arc<AtomicU64>,
    scan_limit: usize,
}

impl Connection {
    /// Wrap an accepted stream.
    pub fn new(
        stream: TcpStream,
        db: Arc<Database>,
        total_requests: Arc<AtomicU64>,
        scan_limit: usize,
    ) -> Self {
        Self {
            stream,
            db,
            total_requests,
            scan_limit,
        }
    }

    /// Drive the connection until the peer disconnects, a frame error
    /// occurs, or shutdown is signalled. An in-flight request finishes
    /// before a shutdown takes effect.
    pub async fn serve(mut self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let mut len_buf = [0u8; 4];
            tokio::select! {
                read = self.stream.read_exact(&mut len_buf) => {
                    if read.is_err() {
                        break;
                    }
                }
                _ = shutdown.recv() => break,
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_MESSAGE_SIZE {
                tracing::warn!(len, "frame exceeds maximum size, closing connection");
                break;
            }

            let mut body = vec![0u8; len];
            tokio::select! {
                read = self.stream.read_exact(&mut body) => {
                    if read.is_err() {
                        break;
                    }
                }
                _ = shutdown.recv() => break,
            }

            let request = match Message::decode(&body) {
                Ok(message) => message,
                Err(err) => {
                    tracing::debug!(%err, "undecodable frame, closing connection");
                    break;
                }
            };

            self.total_requests.fetch_add(1, Ordering::Relaxed);
            let response = process_request(&self.db, &request, self.scan_limit);

            let encoded = response.encode();
            if self
                .stream
                .write_all(&(encoded.len() as u32).to_le_bytes())
                .await
                .is_err()
                || self.stream.write_all(&encoded).await.is_err()
            {
                break;
            }
        }
    }
}

/// Map one request to engine operations inside its own auto-commit
/// transaction and build the response. Always answers with the request id.
pub(crate) fn process_request(db: &Database, request: &Message, scan_limit: usize) -> Message {
    let message_type = match request.message_type() {
        Ok(message_type) => message_type,
        Err(_) => return Message::error(request.id, "Unsupported operation"),
    };

    match message_type {
        MessageType::Ping => Message::pong(request.id),
        MessageType::Get => with_txn(db, request, |txn, request| {
            match txn.get(&request.key)? {
                // An empty stored value answers like a missing key; clients
                // cannot tell the two apart through this protocol.
                Some(value) if !value.is_empty() => Ok(Message::success(request.id, value)),
                _ => Ok(Message::error(request.id, "Key not found")),
            }
        }),
        MessageType::Put => with_txn(db, request, |txn, request| {
            if txn
                .put(request.key.clone(), request.value.clone())
                .is_err()
            {
                return Ok(Message::error(request.id, "Failed to put value"));
            }
            txn.commit()?;
            Ok(Message::success(request.id, b"OK".to_vec()))
        }),
        MessageType::Delete => with_txn(db, request, |txn, request| {
            if txn.delete(&request.key).is_err() {
                return Ok(Message::error(request.id, "Failed to delete key"));
            }
            txn.commit()?;
            Ok(Message::success(request.id, b"OK".to_vec()))
        }),
        MessageType::Scan => with_txn(db, request, |txn, request| {
            let pairs = txn.scan(&request.key, &request.value, scan_limit)?;
            let entries: Vec<ScanEntry> = pairs
                .into_iter()
                .map(|(key, value)| ScanEntry {
                    key: String::from_utf8_lossy(&key).into_owned(),
                    value: String::from_utf8_lossy(&value).into_owned(),
                })
                .collect();
            let payload = serde_json::to_vec(&entries)
                .map_err(|err| Error::InvalidFormat(err.to_string()))?;
            txn.commit()?;
            Ok(Message::success(request.id, payload))
        }),
        MessageType::Pong | MessageType::Error | MessageType::Success => {
            Message::error(request.id, "Unsupported operation")
        }
    }
}

fn with_txn(
    db: &Database,
    request: &Message,
    op: impl FnOnce(&mut corsac_core::Transaction, &Message) -> corsac_core::Result<Message>,
) -> Message {
    let mut txn = match db.begin_transaction() {
        Ok(txn) => txn,
        Err(_) => return Message::error(request.id, "Failed to begin transaction"),
    };
    match op(&mut txn, request) {
        Ok(response) => response,
        Err(err) => Message::error(request.id, &format!("Server error: {err}")),
    }
}
