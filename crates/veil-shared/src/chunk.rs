//! Streaming XChaCha20 transform for file payloads.
//!
//! The keystream is a pure function of the byte offset, so encrypting a
//! file in chunks of any size yields the same bytes as encrypting it whole.
//! Encryption and decryption are the same operation.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::XChaCha20;

use crate::crypto::ContentKey;
use crate::error::CryptoError;

/// A stateful keystream transform bound to one `(key, IV)` pair.
pub struct ChunkCipher {
    cipher: XChaCha20,
    position: u64,
}

impl ChunkCipher {
    pub fn new(content_key: &ContentKey) -> Self {
        let cipher = XChaCha20::new(content_key.key().into(), content_key.iv().into());
        Self {
            cipher,
            position: 0,
        }
    }

    /// Transform one chunk. The output is exactly as long as the input and
    /// the keystream position only moves forward.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut buf = chunk.to_vec();
        self.process_in_place(&mut buf)?;
        Ok(buf)
    }

    pub fn process_in_place(&mut self, buf: &mut [u8]) -> Result<(), CryptoError> {
        self.cipher
            .try_apply_keystream(buf)
            .map_err(|_| CryptoError::KeystreamExhausted {
                position: self.position,
            })?;
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Bytes transformed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Flush residual output. Consumes the cipher so it runs exactly once.
    ///
    /// A keystream cipher never holds back partial blocks, so this is always
    /// empty; callers still transmit whatever it returns.
    pub fn finalize(self) -> Vec<u8> {
        Vec::new()
    }
}

impl std::fmt::Debug for ChunkCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkCipher")
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn encrypt_in_chunks(key: &ContentKey, data: &[u8], sizes: &[usize]) -> Vec<u8> {
        let mut cipher = ChunkCipher::new(key);
        let mut out = Vec::with_capacity(data.len());
        let mut offset = 0;
        let mut i = 0;
        while offset < data.len() {
            let size = sizes[i % sizes.len()].min(data.len() - offset);
            out.extend(cipher.process_chunk(&data[offset..offset + size]).unwrap());
            offset += size;
            i += 1;
        }
        out.extend(cipher.finalize());
        out
    }

    #[test]
    fn test_output_length_matches_input() {
        let key = ContentKey::generate();
        let mut cipher = ChunkCipher::new(&key);
        for len in [0usize, 1, 63, 64, 65, 1000] {
            assert_eq!(cipher.process_chunk(&sample(len)).unwrap().len(), len);
        }
        assert_eq!(cipher.position(), 1 + 63 + 64 + 65 + 1000);
    }

    #[test]
    fn test_chunking_is_boundary_independent() {
        let key = ContentKey::generate();
        let data = sample(10_000);

        let whole = encrypt_in_chunks(&key, &data, &[data.len()]);
        let partitions: [&[usize]; 5] = [&[1], &[7, 13], &[64], &[65, 3, 1000], &[4096]];
        for sizes in partitions {
            assert_eq!(encrypt_in_chunks(&key, &data, sizes), whole, "sizes {sizes:?}");
        }
        assert_ne!(whole, data);
    }

    #[test]
    fn test_decrypt_with_different_chunking() {
        let key = ContentKey::generate();
        let data = sample(5_000);

        let ciphertext = encrypt_in_chunks(&key, &data, &[333]);
        let plaintext = encrypt_in_chunks(&key, &ciphertext, &[17, 1024]);
        assert_eq!(plaintext, data);
    }

    #[test]
    fn test_different_iv_different_stream() {
        let a = ContentKey::generate();
        let b = ContentKey::from_parts(*a.key(), [9u8; 24]);
        let data = sample(128);
        assert_ne!(
            encrypt_in_chunks(&a, &data, &[128]),
            encrypt_in_chunks(&b, &data, &[128])
        );
    }

    #[test]
    fn test_finalize_is_empty() {
        let key = ContentKey::generate();
        let mut cipher = ChunkCipher::new(&key);
        cipher.process_chunk(&sample(77)).unwrap();
        assert!(cipher.finalize().is_empty());
    }
}
