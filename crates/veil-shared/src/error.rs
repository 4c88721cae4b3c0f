use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid key length")]
    InvalidKeyLength,

    #[error("Public key is a low-order point")]
    WeakPublicKey,

    #[error("Keystream exhausted after {position} bytes")]
    KeystreamExhausted { position: u64 },
}

/// The local private key could not recover a wrapped content key.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyUnwrapError {
    #[error("No wrapped key addressed to this client")]
    Missing,

    #[error("Wrapped key is malformed: {0}")]
    Malformed(String),

    #[error("Wrapped key was sealed for a different public key")]
    ForeignKey,
}

/// A content key was recovered but the payload did not decrypt to valid content.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ContentDecryptError {
    #[error("Ciphertext failed authentication")]
    Authentication,

    #[error("Decrypted content is not valid UTF-8")]
    InvalidUtf8,

    #[error("Decrypted file does not match its digest (expected {expected}, got {actual})")]
    IntegrityMismatch { expected: String, actual: String },
}

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error(transparent)]
    KeyUnwrap(#[from] KeyUnwrapError),

    #[error(transparent)]
    ContentDecrypt(#[from] ContentDecryptError),

    #[error("Invalid recipient public key: {0}")]
    InvalidPublicKey(String),

    #[error("No recipient key could be wrapped")]
    NoRecipients,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid key bytes")]
    InvalidKeyBytes,

    #[error("Key file error: {0}")]
    KeyFile(String),

    #[error("Key vault already holds a secret")]
    AlreadyPersisted,
}

/// Malformed or incomplete JSON on the wire.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}
