use serde::{Deserialize, Serialize};

use crate::constants::GROUP_CHAT_ID;

/// Key of a chat session: either the group room or a peer's nickname.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChatId {
    Group,
    Peer(String),
}

impl ChatId {
    /// Map a wire `to` value onto a chat id. Only `"group"` means the group room.
    pub fn from_wire(value: &str) -> Self {
        if value == GROUP_CHAT_ID {
            Self::Group
        } else {
            Self::Peer(value.to_string())
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::Group => GROUP_CHAT_ID,
            Self::Peer(nickname) => nickname,
        }
    }

    pub fn peer(nickname: impl Into<String>) -> Self {
        Self::Peer(nickname.into())
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group)
    }

    pub fn nickname(&self) -> Option<&str> {
        match self {
            Self::Group => None,
            Self::Peer(nickname) => Some(nickname),
        }
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Opaque, server-issued identifier of one file transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TransferId(pub String);

impl TransferId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A peer's public key exactly as broadcast in the roster (base64 text).
///
/// Decoding is deferred until the key is used, so a malformed roster entry
/// only affects the operations that touch that peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct PeerKey(pub String);

impl PeerKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Serde adapter storing byte vectors as standard base64 strings.
pub mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
