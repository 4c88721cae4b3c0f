//! Chunked file transfer.
//!
//! Upload reads the source in `chunk_size` pieces, encrypts each with a
//! [`ChunkCipher`] bound to a fresh per-file key, and posts the ciphertext
//! strictly in order. Download streams ciphertext back through the same
//! transform straight into the sink. Neither side buffers the whole file.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use veil_net::FileTransport;
use veil_shared::chunk::ChunkCipher;
use veil_shared::crypto::ContentKey;
use veil_shared::error::ContentDecryptError;
use veil_shared::protocol::FileMetadata;
use veil_shared::types::TransferId;

use crate::error::{TransferError, TransferStage};
use crate::events::{emit_event, ClientEvent, EventSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferStatus {
    Init,
    Uploading,
    Finalizing,
    Complete,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    fn can_advance_to(self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        matches!(
            (self, next),
            (Init, Uploading) | (Uploading, Finalizing) | (Finalizing, Complete)
        ) || (next == Failed && !self.is_terminal())
    }
}

/// One outgoing file. The content key lives only as long as the record.
#[derive(Debug)]
pub struct FileTransferRecord {
    transfer_id: Option<TransferId>,
    original_filename: String,
    content_key: ContentKey,
    status: TransferStatus,
}

impl FileTransferRecord {
    pub fn new(original_filename: impl Into<String>) -> Self {
        Self {
            transfer_id: None,
            original_filename: original_filename.into(),
            content_key: ContentKey::generate(),
            status: TransferStatus::Init,
        }
    }

    pub fn transfer_id(&self) -> Option<&TransferId> {
        self.transfer_id.as_ref()
    }

    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }
}

/// Moves file bytes between a local source/sink and the [`FileTransport`].
#[derive(Clone)]
pub struct FileTransferCoordinator {
    transport: Arc<dyn FileTransport>,
    chunk_size: usize,
    events: EventSink,
}

impl FileTransferCoordinator {
    pub fn new(transport: Arc<dyn FileTransport>, chunk_size: usize, events: EventSink) -> Self {
        Self {
            transport,
            chunk_size: chunk_size.max(1),
            events,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Advance `record` and report it. Illegal transitions are ignored.
    pub fn set_status(&self, record: &mut FileTransferRecord, next: TransferStatus) {
        if !record.status.can_advance_to(next) {
            debug!(from = ?record.status, to = ?next, "Ignoring invalid transfer transition");
            return;
        }
        record.status = next;
        emit_event(
            &self.events,
            ClientEvent::TransferStatusChanged {
                transfer: record.transfer_id.as_ref().map(ToString::to_string),
                filename: record.original_filename.clone(),
                status: next,
            },
        );
    }

    /// Mark the record failed and report why.
    pub fn fail(&self, record: &mut FileTransferRecord, error: &TransferError) {
        self.set_status(record, TransferStatus::Failed);
        emit_event(
            &self.events,
            ClientEvent::TransferFailed {
                transfer: record.transfer_id.as_ref().map(ToString::to_string),
                filename: record.original_filename.clone(),
                error: error.to_string(),
            },
        );
    }

    /// Upload `source` and leave the record in `Finalizing`.
    ///
    /// Returns the plaintext metadata to announce. Sealing and sending it is
    /// the caller's job, against the roster as it is once this returns.
    /// Progress events report a fraction only when `size_hint` is given;
    /// without it they carry the byte count alone.
    pub async fn upload<R>(
        &self,
        record: &mut FileTransferRecord,
        mut source: R,
        size_hint: Option<u64>,
    ) -> Result<FileMetadata, TransferError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let id = self
            .transport
            .start_upload()
            .await
            .map_err(|e| TransferError::new(TransferStage::Start, e))?;
        record.transfer_id = Some(id.clone());
        self.set_status(record, TransferStatus::Uploading);
        info!(transfer = %id, file = %record.original_filename, "Upload started");

        let mut cipher = ChunkCipher::new(&record.content_key);
        let mut hasher = blake3::Hasher::new();
        let mut buf = vec![0u8; self.chunk_size];
        let mut sent: u64 = 0;
        let mut chunks: usize = 0;

        loop {
            let n = read_full(&mut source, &mut buf)
                .await
                .map_err(|e| TransferError::new(TransferStage::Read, e))?;
            if n == 0 {
                break;
            }

            hasher.update(&buf[..n]);
            let ciphertext = cipher
                .process_chunk(&buf[..n])
                .map_err(|e| TransferError::new(TransferStage::Encrypt, e))?;
            self.transport
                .post_chunk(&id, ciphertext)
                .await
                .map_err(|e| TransferError::new(TransferStage::Chunk, e))?;

            sent += n as u64;
            chunks += 1;
            self.progress(&id, &record.original_filename, sent, size_hint);

            if n < buf.len() {
                break;
            }
        }

        let tail = cipher.finalize();
        if !tail.is_empty() {
            self.transport
                .post_chunk(&id, tail)
                .await
                .map_err(|e| TransferError::new(TransferStage::Chunk, e))?;
            chunks += 1;
        }

        self.transport
            .finish_upload(&id)
            .await
            .map_err(|e| TransferError::new(TransferStage::Finish, e))?;
        self.set_status(record, TransferStatus::Finalizing);
        info!(transfer = %id, chunks, bytes = sent, "Upload finished");

        let mut metadata =
            FileMetadata::new(id, record.original_filename.clone(), &record.content_key);
        metadata.size = Some(sent);
        metadata.blake3 = Some(hasher.finalize().to_hex().to_string());
        Ok(metadata)
    }

    /// Fetch and decrypt the file described by `metadata` into `sink`.
    /// Returns the number of plaintext bytes written.
    pub async fn download<W>(
        &self,
        metadata: &FileMetadata,
        mut sink: W,
    ) -> Result<u64, TransferError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let key = metadata
            .content_key()
            .map_err(|e| TransferError::new(TransferStage::Metadata, e))?;
        let id = &metadata.uuid;
        let mut stream = self
            .transport
            .fetch_stream(id)
            .await
            .map_err(|e| TransferError::new(TransferStage::Fetch, e))?;

        let mut cipher = ChunkCipher::new(&key);
        let mut hasher = blake3::Hasher::new();
        let mut written: u64 = 0;

        while let Some(piece) = stream.next().await {
            let mut buf = piece
                .map_err(|e| TransferError::new(TransferStage::Fetch, e))?
                .to_vec();
            cipher
                .process_in_place(&mut buf)
                .map_err(|e| TransferError::new(TransferStage::Decrypt, e))?;
            hasher.update(&buf);
            sink.write_all(&buf)
                .await
                .map_err(|e| TransferError::new(TransferStage::Write, e))?;
            written += buf.len() as u64;
            self.progress(id, &metadata.original_filename, written, metadata.size);
        }

        let tail = cipher.finalize();
        if !tail.is_empty() {
            hasher.update(&tail);
            sink.write_all(&tail)
                .await
                .map_err(|e| TransferError::new(TransferStage::Write, e))?;
            written += tail.len() as u64;
        }
        sink.flush()
            .await
            .map_err(|e| TransferError::new(TransferStage::Write, e))?;

        if let Some(expected) = &metadata.blake3 {
            let actual = hasher.finalize().to_hex().to_string();
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(TransferError::new(
                    TransferStage::Verify,
                    ContentDecryptError::IntegrityMismatch {
                        expected: expected.clone(),
                        actual,
                    },
                ));
            }
        }

        info!(transfer = %id, bytes = written, "Download complete");
        Ok(written)
    }

    fn progress(&self, id: &TransferId, filename: &str, bytes: u64, total: Option<u64>) {
        let fraction = total.map(|total| {
            if total == 0 {
                1.0
            } else {
                (bytes as f64 / total as f64).min(1.0)
            }
        });
        emit_event(
            &self.events,
            ClientEvent::TransferProgress {
                transfer: id.to_string(),
                filename: filename.to_string(),
                bytes,
                fraction,
            },
        );
    }
}

/// Fill `buf` from `source`, stopping early only at end of input.
async fn read_full<R>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
