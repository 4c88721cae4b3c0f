//! Per-chat message history and unread counters.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use veil_shared::protocol::FileMetadata;
use veil_shared::types::ChatId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Sent,
    Received,
    /// Generated locally (presence, welcome, renames).
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MessageBody {
    Text { text: String },
    File { metadata: FileMetadata },
    Notice { text: String },
    /// A message that arrived but could not be opened.
    Undecryptable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub from: String,
    pub direction: Direction,
    pub body: MessageBody,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(from: impl Into<String>, direction: Direction, body: MessageBody) -> Self {
        Self {
            from: from.into(),
            direction,
            body,
            timestamp: Utc::now(),
        }
    }

    pub fn text(from: impl Into<String>, direction: Direction, text: impl Into<String>) -> Self {
        Self::new(from, direction, MessageBody::Text { text: text.into() })
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self::new("", Direction::Local, MessageBody::Notice { text: text.into() })
    }

    /// Informational notices never count as unread.
    pub fn is_notice(&self) -> bool {
        matches!(self.body, MessageBody::Notice { .. })
    }
}

/// What `insert` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The chat is active; show the message now.
    Surfaced,
    /// Stored in a background chat. `unread` is the chat's new counter.
    Queued { unread: usize },
}

#[derive(Debug, Default)]
struct ChatSession {
    history: Vec<ChatMessage>,
    unread: usize,
}

/// All chat sessions of this client. Sessions are created lazily on their
/// first message and live as long as the client.
#[derive(Debug, Default)]
pub struct SessionStateStore {
    sessions: HashMap<ChatId, ChatSession>,
    active: Option<ChatId>,
}

impl SessionStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chat: ChatId, message: ChatMessage) -> InsertOutcome {
        let is_active = self.active.as_ref() == Some(&chat);
        let counts = !message.is_notice();
        let session = self.sessions.entry(chat).or_default();
        session.history.push(message);

        if is_active {
            InsertOutcome::Surfaced
        } else {
            if counts {
                session.unread += 1;
            }
            InsertOutcome::Queued {
                unread: session.unread,
            }
        }
    }

    /// Move `old`'s history and unread counter to `new`.
    ///
    /// If `new` already has a session the two are merged: `new`'s existing
    /// messages first, then `old`'s, with the counters summed. The active
    /// selection follows the rename, and whichever chat ends up active has
    /// its counter cleared. Returns `false` if `old` had no session.
    pub fn rename(&mut self, old: &ChatId, new: ChatId) -> bool {
        if *old == new {
            return self.sessions.contains_key(old);
        }
        if self.active.as_ref() == Some(old) {
            self.active = Some(new.clone());
        }
        let target_active = self.active.as_ref() == Some(&new);

        let Some(moved) = self.sessions.remove(old) else {
            if target_active {
                if let Some(target) = self.sessions.get_mut(&new) {
                    target.unread = 0;
                }
            }
            return false;
        };

        let target = self.sessions.entry(new.clone()).or_default();
        if !target.history.is_empty() {
            debug!(old = %old, new = %new, "Merging renamed chat into existing one");
        }
        target.history.extend(moved.history);
        target.unread += moved.unread;

        // The active chat never carries unread messages.
        if target_active {
            target.unread = 0;
        }
        true
    }

    /// Make `chat` active, clear its unread counter and return its history for replay.
    pub fn select(&mut self, chat: ChatId) -> &[ChatMessage] {
        if let Some(session) = self.sessions.get_mut(&chat) {
            session.unread = 0;
        }
        self.active = Some(chat);
        self.active
            .as_ref()
            .and_then(|id| self.sessions.get(id))
            .map(|session| session.history.as_slice())
            .unwrap_or(&[])
    }

    pub fn history(&self, chat: &ChatId) -> &[ChatMessage] {
        self.sessions
            .get(chat)
            .map(|session| session.history.as_slice())
            .unwrap_or(&[])
    }

    pub fn unread(&self, chat: &ChatId) -> usize {
        self.sessions.get(chat).map(|s| s.unread).unwrap_or(0)
    }

    pub fn active(&self) -> Option<&ChatId> {
        self.active.as_ref()
    }

    pub fn contains(&self, chat: &ChatId) -> bool {
        self.sessions.contains_key(chat)
    }

    pub fn chats(&self) -> Vec<ChatId> {
        let mut chats: Vec<ChatId> = self.sessions.keys().cloned().collect();
        chats.sort();
        chats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str) -> ChatMessage {
        ChatMessage::text("bob", Direction::Received, text)
    }

    fn texts(history: &[ChatMessage]) -> Vec<String> {
        history
            .iter()
            .map(|m| match &m.body {
                MessageBody::Text { text } | MessageBody::Notice { text } => text.clone(),
                other => format!("{other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_active_chat_surfaces_without_unread() {
        let mut store = SessionStateStore::new();
        store.select(ChatId::Group);

        assert_eq!(store.insert(ChatId::Group, msg("a")), InsertOutcome::Surfaced);
        assert_eq!(store.insert(ChatId::Group, msg("b")), InsertOutcome::Surfaced);
        assert_eq!(store.unread(&ChatId::Group), 0);
        assert_eq!(texts(store.history(&ChatId::Group)), vec!["a", "b"]);
    }

    #[test]
    fn test_inactive_chat_counts_each_message() {
        let mut store = SessionStateStore::new();
        store.select(ChatId::Group);
        let bob = ChatId::peer("bob");

        assert_eq!(
            store.insert(bob.clone(), msg("1")),
            InsertOutcome::Queued { unread: 1 }
        );
        assert_eq!(
            store.insert(bob.clone(), msg("2")),
            InsertOutcome::Queued { unread: 2 }
        );
        assert_eq!(store.unread(&bob), 2);
    }

    #[test]
    fn test_notice_does_not_count() {
        let mut store = SessionStateStore::new();
        let bob = ChatId::peer("bob");

        store.insert(bob.clone(), ChatMessage::notice("bob is online"));
        assert_eq!(store.unread(&bob), 0);
        assert_eq!(store.history(&bob).len(), 1);
    }

    #[test]
    fn test_select_resets_unread_and_replays() {
        let mut store = SessionStateStore::new();
        let bob = ChatId::peer("bob");
        store.insert(bob.clone(), msg("x"));
        store.insert(bob.clone(), msg("y"));

        let replay = texts(store.select(bob.clone()));
        assert_eq!(replay, vec!["x", "y"]);
        assert_eq!(store.unread(&bob), 0);

        store.insert(bob.clone(), msg("z"));
        assert_eq!(store.unread(&bob), 0);
    }

    #[test]
    fn test_select_unknown_chat_is_empty() {
        let mut store = SessionStateStore::new();
        assert!(store.select(ChatId::peer("nobody")).is_empty());
        assert_eq!(store.active(), Some(&ChatId::peer("nobody")));
        assert!(!store.contains(&ChatId::peer("nobody")));
    }

    #[test]
    fn test_rename_moves_history_and_unread() {
        let mut store = SessionStateStore::new();
        store.select(ChatId::Group);
        let old = ChatId::peer("alice");
        let new = ChatId::peer("alicia");
        store.insert(old.clone(), msg("one"));
        store.insert(old.clone(), msg("two"));
        let before = store.history(&old).to_vec();

        assert!(store.rename(&old, new.clone()));
        assert_eq!(store.history(&new), before.as_slice());
        assert_eq!(store.unread(&new), 2);
        assert!(!store.contains(&old));
        assert_eq!(store.unread(&old), 0);
    }

    #[test]
    fn test_rename_onto_existing_merges() {
        let mut store = SessionStateStore::new();
        store.select(ChatId::Group);
        let old = ChatId::peer("alice");
        let new = ChatId::peer("carol");
        store.insert(new.clone(), msg("carol-1"));
        store.insert(old.clone(), msg("alice-1"));
        store.insert(old.clone(), msg("alice-2"));

        store.rename(&old, new.clone());
        assert_eq!(
            texts(store.history(&new)),
            vec!["carol-1", "alice-1", "alice-2"]
        );
        assert_eq!(store.unread(&new), 3);
    }

    #[test]
    fn test_rename_follows_active_selection() {
        let mut store = SessionStateStore::new();
        let old = ChatId::peer("alice");
        let new = ChatId::peer("alicia");
        store.select(old.clone());
        store.insert(old.clone(), msg("hi"));

        store.rename(&old, new.clone());
        assert_eq!(store.active(), Some(&new));
        assert_eq!(store.insert(new.clone(), msg("again")), InsertOutcome::Surfaced);
    }

    #[test]
    fn test_rename_into_active_chat_clears_unread() {
        let mut store = SessionStateStore::new();
        let old = ChatId::peer("alice");
        let new = ChatId::peer("carol");
        store.insert(new.clone(), msg("carol-1"));
        store.insert(old.clone(), msg("alice-1"));
        store.select(new.clone());

        store.rename(&old, new.clone());
        assert_eq!(store.active(), Some(&new));
        assert_eq!(store.unread(&new), 0);
        assert_eq!(store.history(&new).len(), 2);
    }

    #[test]
    fn test_active_rename_onto_unread_chat_clears_unread() {
        let mut store = SessionStateStore::new();
        let old = ChatId::peer("alice");
        let new = ChatId::peer("carol");
        store.insert(new.clone(), msg("carol-1"));
        store.insert(new.clone(), msg("carol-2"));
        store.select(old.clone());

        // `old` has no session yet, only the selection.
        assert!(!store.rename(&old, new.clone()));
        assert_eq!(store.active(), Some(&new));
        assert_eq!(store.unread(&new), 0);

        store.insert(old.clone(), msg("alice-1"));
        store.select(old.clone());
        store.rename(&old, new.clone());
        assert_eq!(store.unread(&new), 0);
        assert_eq!(store.history(&new).len(), 3);
    }

    #[test]
    fn test_rename_missing_is_noop() {
        let mut store = SessionStateStore::new();
        store.insert(ChatId::peer("bob"), msg("x"));
        assert!(!store.rename(&ChatId::peer("ghost"), ChatId::peer("spirit")));
        assert_eq!(store.chats(), vec![ChatId::peer("bob")]);
    }
}
