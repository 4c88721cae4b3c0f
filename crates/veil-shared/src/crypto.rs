use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{
    HKDF_INFO_KEY_WRAP, NONCE_SIZE, PUBKEY_SIZE, STREAM_IV_SIZE, SYMMETRIC_KEY_SIZE,
    WRAPPED_KEY_SIZE,
};
use crate::error::{CryptoError, KeyUnwrapError};

/// A single-use 32-byte symmetric key, wiped when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_SIZE]);

impl SymmetricKey {
    pub fn generate() -> Self {
        let mut key = [0u8; SYMMETRIC_KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: [u8; SYMMETRIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; SYMMETRIC_KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength)?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SymmetricKey").field(&"[REDACTED]").finish()
    }
}

/// Key and IV for one file transfer. Reused across every chunk of that file only.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ContentKey {
    key: [u8; SYMMETRIC_KEY_SIZE],
    iv: [u8; STREAM_IV_SIZE],
}

impl ContentKey {
    pub fn generate() -> Self {
        let mut key = [0u8; SYMMETRIC_KEY_SIZE];
        let mut iv = [0u8; STREAM_IV_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut key);
        rand::rngs::OsRng.fill_bytes(&mut iv);
        Self { key, iv }
    }

    pub fn from_parts(key: [u8; SYMMETRIC_KEY_SIZE], iv: [u8; STREAM_IV_SIZE]) -> Self {
        Self { key, iv }
    }

    /// Parse the hex form carried in file metadata.
    pub fn from_hex(key_hex: &str, iv_hex: &str) -> Result<Self, CryptoError> {
        let key = hex::decode(key_hex).map_err(|_| CryptoError::InvalidKeyLength)?;
        let iv = hex::decode(iv_hex).map_err(|_| CryptoError::InvalidKeyLength)?;
        let key: [u8; SYMMETRIC_KEY_SIZE] =
            key.as_slice().try_into().map_err(|_| CryptoError::InvalidKeyLength)?;
        let iv: [u8; STREAM_IV_SIZE] =
            iv.as_slice().try_into().map_err(|_| CryptoError::InvalidKeyLength)?;
        Ok(Self { key, iv })
    }

    pub fn key(&self) -> &[u8; SYMMETRIC_KEY_SIZE] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; STREAM_IV_SIZE] {
        &self.iv
    }

    pub fn key_hex(&self) -> String {
        hex::encode(self.key)
    }

    pub fn iv_hex(&self) -> String {
        hex::encode(self.iv)
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentKey")
            .field("key", &"[REDACTED]")
            .field("iv", &"[REDACTED]")
            .finish()
    }
}

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

// Returns nonce || ciphertext (24 bytes nonce prepended)
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

// HKDF-SHA256 over the X25519 output, salted with both public keys
fn derive_wrapping_key(
    shared_secret: &[u8; 32],
    ephemeral_public: &[u8; PUBKEY_SIZE],
    recipient_public: &[u8; PUBKEY_SIZE],
) -> SymmetricKey {
    let mut salt = [0u8; PUBKEY_SIZE * 2];
    salt[..PUBKEY_SIZE].copy_from_slice(ephemeral_public);
    salt[PUBKEY_SIZE..].copy_from_slice(recipient_public);

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared_secret);
    let mut okm = [0u8; SYMMETRIC_KEY_SIZE];
    // 32 bytes is always a valid HKDF-SHA256 output length
    let _ = hk.expand(HKDF_INFO_KEY_WRAP, &mut okm);
    let key = SymmetricKey::from_bytes(okm);
    okm.zeroize();
    key
}

/// Seal `key` so that only the holder of `recipient`'s private key can recover it.
///
/// Output: `ephemeral_public (32) || nonce (24) || ciphertext+tag (48)`.
/// Fails with [`CryptoError::WeakPublicKey`] when the recipient key is a low-order point.
pub fn wrap_key(key: &SymmetricKey, recipient: &PublicKey) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = EphemeralSecret::random_from_rng(rand::rngs::OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);
    if !shared.was_contributory() {
        return Err(CryptoError::WeakPublicKey);
    }

    let kek = derive_wrapping_key(
        shared.as_bytes(),
        ephemeral_public.as_bytes(),
        recipient.as_bytes(),
    );
    let sealed = encrypt(&kek, key.as_bytes())?;

    let mut output = Vec::with_capacity(WRAPPED_KEY_SIZE);
    output.extend_from_slice(ephemeral_public.as_bytes());
    output.extend_from_slice(&sealed);
    Ok(output)
}

/// Recover a key sealed by [`wrap_key`] with the local static secret.
pub fn unwrap_key(secret: &StaticSecret, wrapped: &[u8]) -> Result<SymmetricKey, KeyUnwrapError> {
    if wrapped.len() != WRAPPED_KEY_SIZE {
        return Err(KeyUnwrapError::Malformed(format!(
            "expected {WRAPPED_KEY_SIZE} bytes, got {}",
            wrapped.len()
        )));
    }

    let (ephemeral_bytes, sealed) = wrapped.split_at(PUBKEY_SIZE);
    let mut ephemeral_arr = [0u8; PUBKEY_SIZE];
    ephemeral_arr.copy_from_slice(ephemeral_bytes);
    let ephemeral_public = PublicKey::from(ephemeral_arr);
    let own_public = PublicKey::from(secret);

    let shared = secret.diffie_hellman(&ephemeral_public);
    if !shared.was_contributory() {
        return Err(KeyUnwrapError::Malformed(
            "ephemeral key is a low-order point".into(),
        ));
    }

    let kek = derive_wrapping_key(shared.as_bytes(), &ephemeral_arr, own_public.as_bytes());
    let mut opened = decrypt(&kek, sealed).map_err(|_| KeyUnwrapError::ForeignKey)?;
    let key = SymmetricKey::from_slice(&opened)
        .map_err(|_| KeyUnwrapError::Malformed("unwrapped key has wrong length".into()));
    opened.zeroize();
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = SymmetricKey::generate();
        let plaintext = b"nobody on the relay can read this";

        let encrypted = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &encrypted).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = SymmetricKey::generate();
        let key2 = SymmetricKey::generate();

        let encrypted = encrypt(&key1, b"Secret message").unwrap();
        assert!(decrypt(&key2, &encrypted).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = SymmetricKey::generate();
        let mut encrypted = encrypt(&key, b"Important data").unwrap();
        let len = encrypted.len();
        encrypted[len - 1] ^= 0xFF;

        assert!(decrypt(&key, &encrypted).is_err());
    }

    #[test]
    fn test_empty_data_fails() {
        let key = SymmetricKey::generate();
        assert!(decrypt(&key, &[]).is_err());
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let public = PublicKey::from(&secret);
        let key = SymmetricKey::generate();

        let wrapped = wrap_key(&key, &public).unwrap();
        assert_eq!(wrapped.len(), WRAPPED_KEY_SIZE);

        let unwrapped = unwrap_key(&secret, &wrapped).unwrap();
        assert_eq!(unwrapped, key);
    }

    #[test]
    fn test_unwrap_with_other_secret_is_foreign() {
        let alice = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let mallory = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let wrapped = wrap_key(&SymmetricKey::generate(), &PublicKey::from(&alice)).unwrap();

        assert_eq!(
            unwrap_key(&mallory, &wrapped).unwrap_err(),
            KeyUnwrapError::ForeignKey
        );
    }

    #[test]
    fn test_unwrap_truncated_is_malformed() {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let wrapped = wrap_key(&SymmetricKey::generate(), &PublicKey::from(&secret)).unwrap();

        let err = unwrap_key(&secret, &wrapped[..40]).unwrap_err();
        assert!(matches!(err, KeyUnwrapError::Malformed(_)));
    }

    #[test]
    fn test_wrap_rejects_low_order_point() {
        let zero = PublicKey::from([0u8; 32]);
        assert!(wrap_key(&SymmetricKey::generate(), &zero).is_err());
    }

    #[test]
    fn test_content_key_hex_roundtrip() {
        let key = ContentKey::generate();
        let parsed = ContentKey::from_hex(&key.key_hex(), &key.iv_hex()).unwrap();
        assert_eq!(parsed, key);
        assert!(ContentKey::from_hex("abcd", &key.iv_hex()).is_err());
    }
}
