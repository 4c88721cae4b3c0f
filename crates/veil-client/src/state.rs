//! Session state shared between the bridge task and caller-facing operations.
//!
//! [`ClientState`] is wrapped in `Arc<Mutex<>>`. Every lock is taken in a
//! short synchronous scope and released before the next `.await`, so an
//! operation that suspends always re-reads the latest roster on resume.

use tracing::debug;

use veil_shared::types::ChatId;

use crate::events::{emit_event, ClientEvent, EventSink};
use crate::peers::PeerDirectory;
use crate::sessions::{ChatMessage, InsertOutcome, SessionStateStore};

pub struct ClientState {
    /// Random per-session id sent with every registration.
    pub client_id: String,

    /// Nickname the server last assigned us. `None` until the first welcome.
    pub nickname: Option<String>,

    pub peers: PeerDirectory,

    pub sessions: SessionStateStore,

    /// Whether a welcome has been processed this session.
    pub welcomed: bool,
}

impl ClientState {
    pub fn new() -> Self {
        Self {
            client_id: uuid::Uuid::new_v4().to_string(),
            nickname: None,
            peers: PeerDirectory::new(),
            sessions: SessionStateStore::new(),
            welcomed: false,
        }
    }

    pub fn own_nickname(&self) -> &str {
        self.nickname.as_deref().unwrap_or("")
    }

    pub fn is_own(&self, nickname: &str) -> bool {
        self.nickname.as_deref() == Some(nickname)
    }

    /// Insert into a chat and report the outcome as an event.
    pub fn record(&mut self, chat: ChatId, message: ChatMessage, events: &EventSink) {
        let surfaced = message.clone();
        let chat_name = chat.to_string();
        match self.sessions.insert(chat, message) {
            InsertOutcome::Surfaced => emit_event(
                events,
                ClientEvent::MessageSurfaced {
                    chat: chat_name,
                    message: surfaced,
                },
            ),
            InsertOutcome::Queued { unread } => {
                debug!(chat = %chat_name, unread, "Message queued in background chat");
                emit_event(
                    events,
                    ClientEvent::UnreadChanged {
                        chat: chat_name,
                        unread,
                    },
                );
            }
        }
    }

    /// The chat currently shown, falling back to the group chat.
    pub fn active_chat(&self) -> ChatId {
        self.sessions.active().cloned().unwrap_or(ChatId::Group)
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}
