use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::crypto::ContentKey;
use crate::error::ProtocolError;
use crate::types::TransferId;

/// Everything the client sends over the JSON channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Identify this session; sent first on every (re)connect
    #[serde(rename_all = "camelCase")]
    Register {
        #[serde(rename = "clientID")]
        client_id: String,
        public_key: String,
        proposed_nickname: String,
    },

    /// 1:1 message; `data` is an envelope JSON with a single wrapped key
    PrivateMessage { to: String, data: String },

    /// Group message; `data` is an envelope JSON with a wrapped-key map
    GroupMessage { data: String },

    /// Sealed file metadata; `uuid` stays in clear for server-side tracking
    FileShare {
        to: String,
        uuid: TransferId,
        data: String,
    },

    /// Ask the server to rename this session
    ChangeNickname { data: String },
}

/// Everything the server pushes over the JSON channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Registration accepted; carries the assigned nickname and the roster
    Welcome {
        nickname: String,
        users: HashMap<String, String>,
    },

    /// Full roster broadcast
    UserListUpdate { users: HashMap<String, String> },

    PrivateMessage { from: String, data: String },

    GroupMessage { from: String, data: String },

    FileShare {
        from: String,
        #[serde(default)]
        to: String,
        #[serde(default)]
        uuid: Option<TransferId>,
        data: String,
    },

    UserJoined { nickname: String },

    UserLeft { nickname: String },

    #[serde(rename_all = "camelCase")]
    NicknameChanged {
        old_nickname: String,
        new_nickname: String,
        users: HashMap<String, String>,
    },

    /// Rename refused; `data` is a human-readable reason
    NicknameError { data: String },
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::PrivateMessage { .. } => "privateMessage",
            Self::GroupMessage { .. } => "groupMessage",
            Self::FileShare { .. } => "fileShare",
            Self::ChangeNickname { .. } => "changeNickname",
        }
    }
}

impl ServerMessage {
    pub fn from_json(data: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::UserListUpdate { .. } => "userListUpdate",
            Self::PrivateMessage { .. } => "privateMessage",
            Self::GroupMessage { .. } => "groupMessage",
            Self::FileShare { .. } => "fileShare",
            Self::UserJoined { .. } => "userJoined",
            Self::UserLeft { .. } => "userLeft",
            Self::NicknameChanged { .. } => "nicknameChanged",
            Self::NicknameError { .. } => "nicknameError",
        }
    }
}

/// Plaintext metadata of a shared file, sealed inside a `fileShare` envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub uuid: TransferId,
    pub original_filename: String,
    pub file_key: String,
    #[serde(rename = "fileIV")]
    pub file_iv: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// BLAKE3 hex digest of the plaintext, checked after download
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blake3: Option<String>,
}

impl FileMetadata {
    pub fn new(uuid: TransferId, original_filename: String, content_key: &ContentKey) -> Self {
        Self {
            uuid,
            original_filename,
            file_key: content_key.key_hex(),
            file_iv: content_key.iv_hex(),
            size: None,
            blake3: None,
        }
    }

    pub fn content_key(&self) -> Result<ContentKey, ProtocolError> {
        ContentKey::from_hex(&self.file_key, &self.file_iv).map_err(|e| {
            ProtocolError::InvalidField {
                field: "fileKey",
                reason: e.to_string(),
            }
        })
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_field_names() {
        let msg = ClientMessage::Register {
            client_id: "c-1".into(),
            public_key: "pk".into(),
            proposed_nickname: "".into(),
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "register");
        assert_eq!(value["clientID"], "c-1");
        assert_eq!(value["publicKey"], "pk");
        assert_eq!(value["proposedNickname"], "");
    }

    #[test]
    fn test_file_share_shape() {
        let msg = ClientMessage::FileShare {
            to: "group".into(),
            uuid: TransferId("u-1".into()),
            data: "{}".into(),
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "fileShare");
        assert_eq!(value["uuid"], "u-1");
    }

    #[test]
    fn test_parse_nickname_changed() {
        let raw = concat!(
            r#"{"type":"nicknameChanged","oldNickname":"a","#,
            r#""newNickname":"b","users":{"b":"k"}}"#
        );
        match ServerMessage::from_json(raw).unwrap() {
            ServerMessage::NicknameChanged {
                old_nickname,
                new_nickname,
                users,
            } => {
                assert_eq!(old_nickname, "a");
                assert_eq!(new_nickname, "b");
                assert_eq!(users.get("b").map(String::as_str), Some("k"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_protocol_error() {
        assert!(ServerMessage::from_json(r#"{"type":"teleport"}"#).is_err());
    }

    #[test]
    fn test_missing_field_is_protocol_error() {
        assert!(ServerMessage::from_json(r#"{"type":"groupMessage","from":"a"}"#).is_err());
    }

    #[test]
    fn test_file_metadata_wire_names() {
        let key = ContentKey::generate();
        let meta = FileMetadata::new(TransferId("u".into()), "a.txt".into(), &key);
        let value: serde_json::Value = serde_json::from_str(&meta.to_json().unwrap()).unwrap();
        assert_eq!(value["originalFilename"], "a.txt");
        assert!(value["fileKey"].is_string());
        assert!(value["fileIV"].is_string());
        assert!(value.get("blake3").is_none());

        let parsed = FileMetadata::from_json(meta.to_json().unwrap().as_bytes()).unwrap();
        assert_eq!(parsed.content_key().unwrap(), key);
    }
}
