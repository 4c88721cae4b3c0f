/// Application name
pub const APP_NAME: &str = "Veil";

/// Reserved chat id / `to` value for the group chat
pub const GROUP_CHAT_ID: &str = "group";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// X25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// X25519 secret key size in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Symmetric key size in bytes (content keys and file keys)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// XChaCha20 stream IV size in bytes (file transfers)
pub const STREAM_IV_SIZE: usize = 24;

/// Wrapped key: ephemeral public key || nonce || sealed content key
pub const WRAPPED_KEY_SIZE: usize = PUBKEY_SIZE + NONCE_SIZE + SYMMETRIC_KEY_SIZE + TAG_SIZE;

/// Default upload chunk size in bytes (5 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Fixed delay between reconnect attempts in seconds
pub const RECONNECT_DELAY_SECS: u64 = 3;

/// Default relay server base URL
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";

/// HKDF info for per-recipient key wrapping
pub const HKDF_INFO_KEY_WRAP: &[u8] = b"veil-key-wrap-v1";

/// Placeholder shown in place of a message that could not be decrypted
pub const UNDECRYPTABLE_PLACEHOLDER: &str = "!! message could not be decrypted !!";
