//! Session identity: the local X25519 key pair used to unwrap content keys.
//!
//! The private half is created once per session and handed to a [`KeyVault`]
//! exactly once. It never leaves this module in any other form.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::{debug, info};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::constants::SECRET_KEY_SIZE;
use crate::crypto::{self, SymmetricKey};
use crate::error::{IdentityError, KeyUnwrapError};

/// Session-scoped storage for the private key.
pub trait KeyVault: Send + Sync {
    /// Return the stored secret, if one was saved earlier this session.
    fn load(&self) -> Result<Option<Zeroizing<[u8; SECRET_KEY_SIZE]>>, IdentityError>;

    /// Persist the secret. Called at most once per session.
    fn save(&self, secret: &[u8; SECRET_KEY_SIZE]) -> Result<(), IdentityError>;
}

/// Keeps the secret in process memory; the session ends with the process.
#[derive(Default)]
pub struct MemoryVault {
    secret: Mutex<Option<Zeroizing<[u8; SECRET_KEY_SIZE]>>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyVault for MemoryVault {
    fn load(&self) -> Result<Option<Zeroizing<[u8; SECRET_KEY_SIZE]>>, IdentityError> {
        let guard = self
            .secret
            .lock()
            .map_err(|e| IdentityError::KeyFile(format!("Lock poisoned: {e}")))?;
        Ok(guard.clone())
    }

    fn save(&self, secret: &[u8; SECRET_KEY_SIZE]) -> Result<(), IdentityError> {
        let mut guard = self
            .secret
            .lock()
            .map_err(|e| IdentityError::KeyFile(format!("Lock poisoned: {e}")))?;
        if guard.is_some() {
            return Err(IdentityError::AlreadyPersisted);
        }
        *guard = Some(Zeroizing::new(*secret));
        Ok(())
    }
}

/// Stores the secret hex-encoded in a file readable only by its owner.
///
/// The vault never deletes the file. Point it at a per-session runtime
/// directory (e.g. under `$XDG_RUNTIME_DIR`) that is cleared when the
/// session ends; a path that outlives the session outlives the identity too.
pub struct FileVault {
    path: PathBuf,
}

impl FileVault {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl KeyVault for FileVault {
    fn load(&self) -> Result<Option<Zeroizing<[u8; SECRET_KEY_SIZE]>>, IdentityError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = Zeroizing::new(
            std::fs::read_to_string(&self.path)
                .map_err(|e| IdentityError::KeyFile(format!("{}: {e}", self.path.display())))?,
        );
        let bytes = Zeroizing::new(
            hex::decode(text.trim()).map_err(|_| IdentityError::InvalidKeyBytes)?,
        );
        let secret: [u8; SECRET_KEY_SIZE] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| IdentityError::InvalidKeyBytes)?;
        Ok(Some(Zeroizing::new(secret)))
    }

    fn save(&self, secret: &[u8; SECRET_KEY_SIZE]) -> Result<(), IdentityError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| IdentityError::KeyFile(format!("{}: {e}", parent.display())))?;
        }

        let key_file_error =
            |e: io::Error| IdentityError::KeyFile(format!("{}: {e}", self.path.display()));
        let mut file = create_private(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => IdentityError::AlreadyPersisted,
            _ => key_file_error(e),
        })?;
        let encoded = Zeroizing::new(hex::encode(secret));
        file.write_all(encoded.as_bytes()).map_err(key_file_error)?;
        file.sync_all().map_err(key_file_error)?;
        debug!(path = %self.path.display(), "Session key written");
        Ok(())
    }
}

// Fails if the file already exists, so two sessions never share a key file.
#[cfg(unix)]
fn create_private(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

/// The local asymmetric key pair. Constructed once per session and shared by
/// reference with everything that needs to unwrap keys.
pub struct IdentityKeyStore {
    secret: StaticSecret,
    public: PublicKey,
}

impl IdentityKeyStore {
    /// Return the key pair saved earlier this session, or generate and save a new one.
    pub fn generate_or_load(vault: &dyn KeyVault) -> Result<Self, IdentityError> {
        if let Some(secret) = vault.load()? {
            let store = Self::from_secret_bytes(*secret);
            debug!(public_key = %store.public_key_b64(), "Loaded session identity");
            return Ok(store);
        }

        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        vault.save(secret.as_bytes())?;
        let public = PublicKey::from(&secret);
        let store = Self { secret, public };
        info!(public_key = %store.public_key_b64(), "Generated new session identity");
        Ok(store)
    }

    /// Restore from raw secret bytes.
    pub fn from_secret_bytes(secret: [u8; SECRET_KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(secret);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Public key in the base64 form used by `register` and the roster.
    pub fn public_key_b64(&self) -> String {
        STANDARD.encode(self.public.as_bytes())
    }

    /// Recover a content key that was wrapped for this identity.
    pub fn unwrap(&self, wrapped: &[u8]) -> Result<SymmetricKey, KeyUnwrapError> {
        crypto::unwrap_key(&self.secret, wrapped)
    }
}

/// Decode a roster public key (base64, 32 bytes).
pub fn decode_public_key(encoded: &str) -> Result<PublicKey, IdentityError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|_| IdentityError::InvalidKeyBytes)?;
    let arr: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| IdentityError::InvalidKeyBytes)?;
    Ok(PublicKey::from(arr))
}
