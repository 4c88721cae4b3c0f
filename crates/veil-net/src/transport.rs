//! File sub-protocol: chunked ciphertext upload and streamed download.
//!
//! The server only ever sees opaque ciphertext bytes addressed by a
//! server-issued transfer id.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use veil_shared::types::TransferId;

use crate::error::TransportError;

/// Ciphertext bytes arriving from a download, in order.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// The byte-moving half of the transport. Chunk posts for one transfer are
/// strictly sequential; callers await each before sending the next.
#[async_trait]
pub trait FileTransport: Send + Sync {
    /// Ask the server for a fresh transfer id.
    async fn start_upload(&self) -> Result<TransferId, TransportError>;

    /// Append one ciphertext chunk to the transfer.
    async fn post_chunk(&self, id: &TransferId, chunk: Vec<u8>) -> Result<(), TransportError>;

    /// Mark the transfer complete. No further chunks are accepted.
    async fn finish_upload(&self, id: &TransferId) -> Result<(), TransportError>;

    /// Stream the stored ciphertext back.
    async fn fetch_stream(&self, id: &TransferId) -> Result<ByteStream, TransportError>;
}

#[derive(Deserialize)]
struct StartResponse {
    uuid: Option<String>,
}

#[derive(Serialize)]
struct FinishRequest<'a> {
    uuid: &'a str,
}

/// [`FileTransport`] over the relay's HTTP endpoints.
#[derive(Debug, Clone)]
pub struct HttpFileTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFileTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn check_status(
    endpoint: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status {
            endpoint,
            status: status.as_u16(),
        });
    }
    Ok(response)
}

#[async_trait]
impl FileTransport for HttpFileTransport {
    async fn start_upload(&self) -> Result<TransferId, TransportError> {
        let response = self.client.post(self.url("/upload/start")).send().await?;
        let body: StartResponse = check_status("/upload/start", response)?.json().await?;

        match body.uuid {
            Some(uuid) if !uuid.is_empty() => {
                debug!(transfer = %uuid, "Upload started");
                Ok(TransferId(uuid))
            }
            _ => Err(TransportError::MalformedResponse {
                endpoint: "/upload/start",
                reason: "missing uuid".into(),
            }),
        }
    }

    async fn post_chunk(&self, id: &TransferId, chunk: Vec<u8>) -> Result<(), TransportError> {
        let len = chunk.len();
        let response = self
            .client
            .post(self.url("/upload/chunk"))
            .query(&[("uuid", id.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(chunk)
            .send()
            .await?;
        check_status("/upload/chunk", response)?;
        debug!(transfer = %id, len, "Chunk posted");
        Ok(())
    }

    async fn finish_upload(&self, id: &TransferId) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.url("/upload/finish"))
            .json(&FinishRequest { uuid: id.as_str() })
            .send()
            .await?;
        check_status("/upload/finish", response)?;
        Ok(())
    }

    async fn fetch_stream(&self, id: &TransferId) -> Result<ByteStream, TransportError> {
        let response = self
            .client
            .get(self.url(&format!("/download/{}", id.as_str())))
            .send()
            .await?;
        let response = check_status("/download", response)?;
        Ok(response.bytes_stream().map_err(TransportError::from).boxed())
    }
}
