use std::fmt;

use thiserror::Error;

use veil_net::TransportError;
use veil_shared::error::{EnvelopeError, IdentityError, ProtocolError};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Invalid nickname: {0}")]
    InvalidNickname(String),

    #[error("Connection command channel closed")]
    ChannelClosed,

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Where in a file transfer a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Start,
    Read,
    Encrypt,
    Chunk,
    Finish,
    Announce,
    Metadata,
    Fetch,
    Decrypt,
    Write,
    Verify,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "upload start",
            Self::Read => "source read",
            Self::Encrypt => "chunk encryption",
            Self::Chunk => "chunk upload",
            Self::Finish => "upload finish",
            Self::Announce => "metadata announce",
            Self::Metadata => "metadata decode",
            Self::Fetch => "download",
            Self::Decrypt => "chunk decryption",
            Self::Write => "sink write",
            Self::Verify => "integrity check",
        };
        f.write_str(name)
    }
}

/// A file transfer aborted. Transfers are not resumable; retrying means
/// starting a new upload.
#[derive(Error, Debug)]
#[error("Transfer failed at {stage}: {source}")]
pub struct TransferError {
    pub stage: TransferStage,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl TransferError {
    pub fn new(
        stage: TransferStage,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}
