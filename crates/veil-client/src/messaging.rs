//! Composing outbound messages.

use tracing::{debug, info};

use veil_shared::constants::GROUP_CHAT_ID;
use veil_shared::envelope::{self, Envelope};
use veil_shared::protocol::ClientMessage;
use veil_shared::types::{ChatId, PeerKey};

use crate::client::Client;
use crate::config::SelfWrapPolicy;
use crate::error::ClientError;
use crate::peers::PeerDirectory;
use crate::sessions::{ChatMessage, Direction};

/// Seal `plaintext` for everyone who should read it in `chat`.
///
/// Group envelopes wrap the key for every roster entry, minus our own
/// nickname under [`SelfWrapPolicy::ExcludeSelf`]. Peer envelopes wrap it
/// for that one peer.
pub fn seal_for_chat(
    peers: &PeerDirectory,
    own_nickname: Option<&str>,
    policy: SelfWrapPolicy,
    chat: &ChatId,
    plaintext: &[u8],
) -> Result<Envelope, ClientError> {
    match chat {
        ChatId::Group => {
            let recipients: Vec<(String, PeerKey)> = peers
                .snapshot()
                .into_iter()
                .filter(|(nickname, _)| {
                    policy == SelfWrapPolicy::IncludeSelf || Some(nickname.as_str()) != own_nickname
                })
                .collect();
            let envelope = envelope::encrypt_for_recipients(
                plaintext,
                recipients.iter().map(|(nickname, key)| (nickname.as_str(), key)),
            )?;
            Ok(envelope)
        }
        ChatId::Peer(nickname) => {
            let key = peers
                .lookup(nickname)
                .ok_or_else(|| ClientError::UnknownRecipient(nickname.clone()))?;
            Ok(envelope::encrypt_for_peer(plaintext, key)?)
        }
    }
}

/// Where a send pinned to `pinned` at its start should go now.
///
/// Group chats resolve to themselves. A peer chat keeps its nickname while
/// that nickname still holds the pinned key; after a rename it follows the
/// key; if the key left the roster the nickname is used if still present.
pub fn resolve_chat(
    peers: &PeerDirectory,
    chat: &ChatId,
    pinned: Option<&PeerKey>,
) -> Option<ChatId> {
    let (ChatId::Peer(nickname), Some(key)) = (chat, pinned) else {
        return Some(chat.clone());
    };
    if peers.lookup(nickname) == Some(key) {
        return Some(chat.clone());
    }
    if let Some(current) = peers.nickname_for(key) {
        return Some(ChatId::peer(current));
    }
    peers.contains(nickname).then(|| chat.clone())
}

impl Client {
    /// Seal against the roster as it is at this moment.
    pub(crate) fn seal_now(
        &self,
        chat: &ChatId,
        plaintext: &[u8],
    ) -> Result<Envelope, ClientError> {
        let state = self.lock_state()?;
        seal_for_chat(
            &state.peers,
            state.nickname.as_deref(),
            self.config().self_wrap,
            chat,
            plaintext,
        )
    }

    /// Encrypt and send a text message, then store our own copy of it.
    pub async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), ClientError> {
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let envelope = self.seal_now(&chat, text.as_bytes())?;
        let recipients = envelope.recipient_count();
        let data = envelope.to_json()?;
        let message = match &chat {
            ChatId::Group => ClientMessage::GroupMessage { data },
            ChatId::Peer(nickname) => ClientMessage::PrivateMessage {
                to: nickname.clone(),
                data,
            },
        };
        self.send(message).await?;
        debug!(chat = %chat, recipients, "Message sent");

        let mut state = self.lock_state()?;
        let own = state.own_nickname().to_string();
        state.record(chat, ChatMessage::text(own, Direction::Sent, text), self.events());
        Ok(())
    }

    /// Ask the server to rename us. The change takes effect when the
    /// server broadcasts `nicknameChanged`.
    pub async fn change_nickname(&self, nickname: &str) -> Result<(), ClientError> {
        let nickname = nickname.trim();
        if nickname.is_empty() || nickname == GROUP_CHAT_ID {
            return Err(ClientError::InvalidNickname(nickname.to_string()));
        }
        let unchanged = self.lock_state()?.is_own(nickname);
        if unchanged {
            return Ok(());
        }

        info!(nickname, "Requesting nickname change");
        self.send(ClientMessage::ChangeNickname {
            data: nickname.to_string(),
        })
        .await
    }
}
