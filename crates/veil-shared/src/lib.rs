// Primitives and wire shapes shared by every Veil layer.

pub mod chunk;
pub mod constants;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod types;

pub use chunk::ChunkCipher;
pub use crypto::{ContentKey, SymmetricKey};
pub use envelope::{Envelope, WrappedKey, WrappedKeys};
pub use error::{
    ContentDecryptError, CryptoError, EnvelopeError, IdentityError, KeyUnwrapError, ProtocolError,
};
pub use identity::{FileVault, IdentityKeyStore, KeyVault, MemoryVault};
pub use protocol::{ClientMessage, FileMetadata, ServerMessage};
pub use types::{ChatId, PeerKey, TransferId};
