//! Roster of online peers: nickname to public key.
//!
//! The server broadcasts the full roster on every change, so the directory
//! is swapped wholesale rather than merged.

use std::collections::BTreeMap;

use tracing::debug;

use veil_shared::types::PeerKey;

#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    peers: BTreeMap<String, PeerKey>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole roster. Nothing from the previous roster survives.
    pub fn replace<I>(&mut self, users: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.peers = users
            .into_iter()
            .map(|(nickname, key)| (nickname, PeerKey(key)))
            .collect();
        debug!(peers = self.peers.len(), "Roster replaced");
    }

    pub fn lookup(&self, nickname: &str) -> Option<&PeerKey> {
        self.peers.get(nickname)
    }

    /// Move `old`'s key to `new` in one step. No-op if `old` is unknown.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        if old == new {
            return self.peers.contains_key(old);
        }
        match self.peers.remove(old) {
            Some(key) => {
                self.peers.insert(new.to_string(), key);
                true
            }
            None => false,
        }
    }

    /// Nickname currently holding `key`, if any.
    pub fn nickname_for(&self, key: &PeerKey) -> Option<&str> {
        self.peers
            .iter()
            .find(|(_, held)| *held == key)
            .map(|(nickname, _)| nickname.as_str())
    }

    /// Copy of the roster as it is right now.
    pub fn snapshot(&self) -> BTreeMap<String, PeerKey> {
        self.peers.clone()
    }

    pub fn contains(&self, nickname: &str) -> bool {
        self.peers.contains_key(nickname)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn nicknames(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }
}
