//! The JSON message channel as seen by the supervisor.
//!
//! Framing (WebSocket or otherwise) lives behind these traits; the
//! supervisor only sends `ClientMessage`s and receives `ServerMessage`s.

use async_trait::async_trait;

use veil_shared::protocol::{ClientMessage, ServerMessage};

use crate::error::TransportError;

/// One live session with the relay.
#[async_trait]
pub trait Connection: Send {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError>;

    /// Next server message, or `Ok(None)` once the server closed the channel.
    /// Must be cancel-safe: the supervisor drops a pending call whenever an
    /// outbound command arrives.
    async fn recv(&mut self) -> Result<Option<ServerMessage>, TransportError>;
}

/// Opens new [`Connection`]s. Called again after every disconnect.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError>;
}
