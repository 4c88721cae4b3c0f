//! Hybrid envelope encryption.
//!
//! A fresh content key encrypts the payload once; the content key is then
//! wrapped separately under each recipient's public key. Everyone addressed
//! by one envelope therefore decrypts the identical ciphertext.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::crypto::{self, SymmetricKey};
use crate::error::{ContentDecryptError, EnvelopeError, KeyUnwrapError, ProtocolError};
use crate::identity::{decode_public_key, IdentityKeyStore};
use crate::types::{b64, PeerKey};

/// A content key sealed for one recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WrappedKey(#[serde(with = "b64")] pub Vec<u8>);

impl WrappedKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Either a single wrapped key (1:1) or one per recipient nickname (group fan-out).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WrappedKeys {
    #[serde(rename = "wrappedKey")]
    Single(WrappedKey),
    #[serde(rename = "wrappedKeys")]
    Fanout(BTreeMap<String, WrappedKey>),
}

/// `{ciphertext, wrappedKey}` or `{ciphertext, wrappedKeys}` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(flatten)]
    pub keys: WrappedKeys,
}

impl Envelope {
    /// The wrapped key this client should try: the single key of a 1:1
    /// envelope, or the entry under `own_nickname` in a fan-out.
    pub fn wrapped_for(&self, own_nickname: &str) -> Option<&WrappedKey> {
        match &self.keys {
            WrappedKeys::Single(key) => Some(key),
            WrappedKeys::Fanout(keys) => keys.get(own_nickname),
        }
    }

    pub fn recipient_count(&self) -> usize {
        match &self.keys {
            WrappedKeys::Single(_) => 1,
            WrappedKeys::Fanout(keys) => keys.len(),
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(data)?)
    }
}

fn wrap_for(key: &SymmetricKey, recipient: &PeerKey) -> Result<WrappedKey, EnvelopeError> {
    let public = decode_public_key(recipient.as_str())
        .map_err(|e| EnvelopeError::InvalidPublicKey(e.to_string()))?;
    let wrapped = crypto::wrap_key(key, &public)
        .map_err(|e| EnvelopeError::InvalidPublicKey(e.to_string()))?;
    Ok(WrappedKey(wrapped))
}

/// Seal `plaintext` for exactly one peer. Fails if that peer's key is unusable.
pub fn encrypt_for_peer(plaintext: &[u8], recipient: &PeerKey) -> Result<Envelope, EnvelopeError> {
    let key = SymmetricKey::generate();
    let ciphertext = crypto::encrypt(&key, plaintext)?;
    let wrapped = wrap_for(&key, recipient)?;
    Ok(Envelope {
        ciphertext,
        keys: WrappedKeys::Single(wrapped),
    })
}

/// Seal `plaintext` for every `(nickname, key)` in `recipients`.
///
/// Recipients whose key cannot be used are left out of `wrappedKeys` and the
/// rest are still served. Fails only if nobody could be wrapped.
pub fn encrypt_for_recipients<'a, I>(
    plaintext: &[u8],
    recipients: I,
) -> Result<Envelope, EnvelopeError>
where
    I: IntoIterator<Item = (&'a str, &'a PeerKey)>,
{
    let key = SymmetricKey::generate();
    let ciphertext = crypto::encrypt(&key, plaintext)?;

    let mut wrapped_keys = BTreeMap::new();
    for (nickname, recipient) in recipients {
        match wrap_for(&key, recipient) {
            Ok(wrapped) => {
                wrapped_keys.insert(nickname.to_string(), wrapped);
            }
            Err(e) => {
                warn!(
                    recipient = %nickname,
                    error = %e,
                    "Skipping recipient with unusable public key"
                );
            }
        }
    }

    if wrapped_keys.is_empty() {
        return Err(EnvelopeError::NoRecipients);
    }

    debug!(
        recipients = wrapped_keys.len(),
        ciphertext_len = ciphertext.len(),
        "Sealed group envelope"
    );

    Ok(Envelope {
        ciphertext,
        keys: WrappedKeys::Fanout(wrapped_keys),
    })
}

/// Unwrap `own_wrapped` with the local identity and decrypt the envelope body.
pub fn decrypt(
    identity: &IdentityKeyStore,
    envelope: &Envelope,
    own_wrapped: Option<&WrappedKey>,
) -> Result<Vec<u8>, EnvelopeError> {
    let wrapped = own_wrapped.ok_or(KeyUnwrapError::Missing)?;
    let key = identity.unwrap(wrapped.as_bytes())?;
    crypto::decrypt(&key, &envelope.ciphertext)
        .map_err(|_| EnvelopeError::ContentDecrypt(ContentDecryptError::Authentication))
}

/// [`decrypt`] followed by UTF-8 validation, for text payloads.
pub fn decrypt_text(
    identity: &IdentityKeyStore,
    envelope: &Envelope,
    own_nickname: &str,
) -> Result<String, EnvelopeError> {
    let bytes = decrypt(identity, envelope, envelope.wrapped_for(own_nickname))?;
    String::from_utf8(bytes).map_err(|_| ContentDecryptError::InvalidUtf8.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MemoryVault;

    fn identity() -> IdentityKeyStore {
        IdentityKeyStore::generate_or_load(&MemoryVault::new()).unwrap()
    }

    fn peer_key(id: &IdentityKeyStore) -> PeerKey {
        PeerKey(id.public_key_b64())
    }

    #[test]
    fn test_peer_envelope_roundtrip() {
        let bob = identity();
        let envelope = encrypt_for_peer(b"hello bob", &peer_key(&bob)).unwrap();

        let plaintext = decrypt_text(&bob, &envelope, "bob").unwrap();
        assert_eq!(plaintext, "hello bob");
    }

    #[test]
    fn test_group_envelope_every_recipient_decrypts() {
        let alice = identity();
        let bob = identity();
        let carol = identity();
        let (ka, kb, kc) = (peer_key(&alice), peer_key(&bob), peer_key(&carol));
        let recipients = vec![("alice", &ka), ("bob", &kb), ("carol", &kc)];

        let envelope = encrypt_for_recipients(b"hi all", recipients).unwrap();
        assert_eq!(envelope.recipient_count(), 3);

        for (nick, id) in [("alice", &alice), ("bob", &bob), ("carol", &carol)] {
            assert_eq!(decrypt_text(id, &envelope, nick).unwrap(), "hi all");
        }
    }

    #[test]
    fn test_malformed_recipient_is_skipped() {
        let alice = identity();
        let bob = identity();
        let (ka, kb) = (peer_key(&alice), peer_key(&bob));
        let broken = PeerKey::from("not-a-key");
        let recipients = vec![("alice", &ka), ("mallory", &broken), ("bob", &kb)];

        let envelope = encrypt_for_recipients(b"resilient", recipients).unwrap();

        assert!(envelope.wrapped_for("mallory").is_none());
        assert_eq!(decrypt_text(&alice, &envelope, "alice").unwrap(), "resilient");
        assert_eq!(decrypt_text(&bob, &envelope, "bob").unwrap(), "resilient");
    }

    #[test]
    fn test_no_usable_recipient_fails() {
        let broken = PeerKey::from("still-not-a-key");
        let result = encrypt_for_recipients(b"x", vec![("mallory", &broken)]);
        assert!(matches!(result, Err(EnvelopeError::NoRecipients)));
    }

    #[test]
    fn test_missing_own_entry_is_key_unwrap_error() {
        let alice = identity();
        let ka = peer_key(&alice);
        let envelope = encrypt_for_recipients(b"not for dave", vec![("alice", &ka)]).unwrap();

        let dave = identity();
        let err = decrypt_text(&dave, &envelope, "dave").unwrap_err();
        assert!(matches!(err, EnvelopeError::KeyUnwrap(KeyUnwrapError::Missing)));
    }

    #[test]
    fn test_wrong_private_key_is_key_unwrap_error() {
        let bob = identity();
        let eve = identity();
        let envelope = encrypt_for_peer(b"for bob only", &peer_key(&bob)).unwrap();

        let err = decrypt_text(&eve, &envelope, "eve").unwrap_err();
        assert!(matches!(err, EnvelopeError::KeyUnwrap(KeyUnwrapError::ForeignKey)));
    }

    #[test]
    fn test_tampered_body_is_content_decrypt_error() {
        let bob = identity();
        let mut envelope = encrypt_for_peer(b"intact", &peer_key(&bob)).unwrap();
        let last = envelope.ciphertext.len() - 1;
        envelope.ciphertext[last] ^= 0x01;

        let err = decrypt_text(&bob, &envelope, "bob").unwrap_err();
        assert!(matches!(
            err,
            EnvelopeError::ContentDecrypt(ContentDecryptError::Authentication)
        ));
    }

    #[test]
    fn test_fresh_key_per_message() {
        let bob = identity();
        let kb = peer_key(&bob);
        let first = encrypt_for_peer(b"same text", &kb).unwrap();
        let second = encrypt_for_peer(b"same text", &kb).unwrap();
        assert_ne!(first.ciphertext, second.ciphertext);
        assert_ne!(first.wrapped_for("bob"), second.wrapped_for("bob"));
    }

    #[test]
    fn test_json_field_names() {
        let bob = identity();
        let kb = peer_key(&bob);

        let single = encrypt_for_peer(b"1:1", &kb).unwrap().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&single).unwrap();
        assert!(value.get("ciphertext").is_some());
        assert!(value.get("wrappedKey").is_some());

        let group = encrypt_for_recipients(b"fan", vec![("bob", &kb)]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&group.to_json().unwrap()).unwrap();
        assert!(value["wrappedKeys"]["bob"].is_string());

        let parsed = Envelope::from_json(&group.to_json().unwrap()).unwrap();
        assert_eq!(decrypt_text(&bob, &parsed, "bob").unwrap(), "fan");
    }
}
