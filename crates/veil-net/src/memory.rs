//! In-process transports for local runs and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;

use veil_shared::protocol::{ClientMessage, ServerMessage};
use veil_shared::types::TransferId;

use crate::connection::{Connection, Connector};
use crate::error::TransportError;
use crate::transport::{ByteStream, FileTransport};

// ---------------------------------------------------------------------------
// Message channel
// ---------------------------------------------------------------------------

/// The relay's end of one in-memory connection.
pub struct ServerSide {
    from_client: mpsc::UnboundedReceiver<ClientMessage>,
    to_client: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerSide {
    /// Next message the client sent, or `None` once it hung up.
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        self.from_client.recv().await
    }

    pub fn send(&self, message: ServerMessage) -> Result<(), TransportError> {
        self.to_client.send(message).map_err(|_| TransportError::Closed)
    }
}

struct MemoryConnection {
    to_server: mpsc::UnboundedSender<ClientMessage>,
    from_server: mpsc::UnboundedReceiver<ServerMessage>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError> {
        self.to_server
            .send(message.clone())
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Result<Option<ServerMessage>, TransportError> {
        Ok(self.from_server.recv().await)
    }
}

/// Hands every new connection's [`ServerSide`] to whoever holds the accept
/// receiver. Dropping a `ServerSide` disconnects that client.
pub struct MemoryConnector {
    accept: mpsc::UnboundedSender<ServerSide>,
    refuse_next: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerSide>) {
        let (accept, accepted) = mpsc::unbounded_channel();
        let connector = Self {
            accept,
            refuse_next: Arc::new(AtomicUsize::new(0)),
        };
        (connector, accepted)
    }

    /// Make the next `count` connection attempts fail.
    pub fn refuse_next(&self, count: usize) {
        self.refuse_next.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        let refused = self
            .refuse_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Connect("connection refused".into()));
        }

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        self.accept
            .send(ServerSide {
                from_client,
                to_client,
            })
            .map_err(|_| TransportError::Connect("relay is gone".into()))?;

        Ok(Box::new(MemoryConnection {
            to_server,
            from_server,
        }))
    }
}

// ---------------------------------------------------------------------------
// File sub-protocol
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoredTransfer {
    chunks: Vec<Vec<u8>>,
    finished: bool,
}

#[derive(Default)]
struct FileStore {
    transfers: HashMap<TransferId, StoredTransfer>,
    next_id: u64,
    chunk_posts: usize,
    finish_calls: usize,
    fail_chunk_at: Option<usize>,
}

/// Keeps uploaded ciphertext in memory and counts calls per endpoint.
#[derive(Clone, Default)]
pub struct MemoryFileTransport {
    store: Arc<Mutex<FileStore>>,
    download_chunk_size: Option<usize>,
}

impl MemoryFileTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-slice downloads into pieces of `size` bytes instead of replaying
    /// the uploaded chunk boundaries.
    pub fn with_download_chunk_size(mut self, size: usize) -> Self {
        self.download_chunk_size = Some(size.max(1));
        self
    }

    /// Make the `n`th chunk post (1-based, counted across all transfers) fail.
    pub fn fail_chunk_at(&self, n: usize) {
        if let Ok(mut store) = self.store.lock() {
            store.fail_chunk_at = Some(n);
        }
    }

    pub fn chunk_posts(&self) -> usize {
        self.store.lock().map(|s| s.chunk_posts).unwrap_or(0)
    }

    pub fn finish_calls(&self) -> usize {
        self.store.lock().map(|s| s.finish_calls).unwrap_or(0)
    }

    /// Concatenated ciphertext stored for `id`.
    pub fn stored(&self, id: &TransferId) -> Option<Vec<u8>> {
        let store = self.store.lock().ok()?;
        store.transfers.get(id).map(|t| t.chunks.concat())
    }

    fn lock(&self) -> Result<MutexGuard<'_, FileStore>, TransportError> {
        self.store
            .lock()
            .map_err(|e| TransportError::Io(std::io::Error::other(format!("Lock poisoned: {e}"))))
    }
}

#[async_trait]
impl FileTransport for MemoryFileTransport {
    async fn start_upload(&self) -> Result<TransferId, TransportError> {
        let mut store = self.lock()?;
        store.next_id += 1;
        let id = TransferId(format!("mem-{}", store.next_id));
        store.transfers.insert(id.clone(), StoredTransfer::default());
        Ok(id)
    }

    async fn post_chunk(&self, id: &TransferId, chunk: Vec<u8>) -> Result<(), TransportError> {
        let mut store = self.lock()?;
        store.chunk_posts += 1;
        if store.fail_chunk_at == Some(store.chunk_posts) {
            return Err(TransportError::Status {
                endpoint: "/upload/chunk",
                status: 500,
            });
        }
        match store.transfers.get_mut(id) {
            Some(transfer) if !transfer.finished => {
                transfer.chunks.push(chunk);
                Ok(())
            }
            _ => Err(TransportError::UnknownTransfer(id.to_string())),
        }
    }

    async fn finish_upload(&self, id: &TransferId) -> Result<(), TransportError> {
        let mut store = self.lock()?;
        store.finish_calls += 1;
        let transfer = store
            .transfers
            .get_mut(id)
            .ok_or_else(|| TransportError::UnknownTransfer(id.to_string()))?;
        transfer.finished = true;
        Ok(())
    }

    async fn fetch_stream(&self, id: &TransferId) -> Result<ByteStream, TransportError> {
        let chunks = {
            let store = self.lock()?;
            match store.transfers.get(id) {
                Some(transfer) if transfer.finished => transfer.chunks.clone(),
                _ => return Err(TransportError::UnknownTransfer(id.to_string())),
            }
        };

        let pieces: Vec<Result<Bytes, TransportError>> = match self.download_chunk_size {
            Some(size) => chunks
                .concat()
                .chunks(size)
                .map(|piece| Ok(Bytes::copy_from_slice(piece)))
                .collect(),
            None => chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect(),
        };
        Ok(futures::stream::iter(pieces).boxed())
    }
}
