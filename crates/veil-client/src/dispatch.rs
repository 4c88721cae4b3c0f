//! Incoming server message dispatch.
//!
//! One exhaustive match over [`ServerMessage`]. Decryption failures never
//! propagate: they become a visible placeholder in the affected chat.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use veil_shared::constants::UNDECRYPTABLE_PLACEHOLDER;
use veil_shared::envelope::{self, Envelope};
use veil_shared::identity::IdentityKeyStore;
use veil_shared::protocol::{FileMetadata, ServerMessage};
use veil_shared::types::{ChatId, TransferId};

use crate::error::ClientError;
use crate::events::{emit_event, ClientEvent, EventSink};
use crate::sessions::{ChatMessage, Direction, MessageBody};
use crate::state::ClientState;

pub fn dispatch(
    identity: &IdentityKeyStore,
    state: &mut ClientState,
    events: &EventSink,
    message: ServerMessage,
) {
    debug!(kind = message.kind(), "Dispatching server message");

    match message {
        ServerMessage::Welcome { nickname, users } => {
            on_welcome(state, events, nickname, users);
        }

        ServerMessage::UserListUpdate { users } => {
            state.peers.replace(users);
            emit_roster(state, events);
        }

        ServerMessage::PrivateMessage { from, data } => {
            let body = open_text(identity, &data, state.own_nickname(), &from);
            state.record(
                ChatId::peer(from.clone()),
                ChatMessage::new(from, Direction::Received, body),
                events,
            );
        }

        ServerMessage::GroupMessage { from, data } => {
            if state.is_own(&from) {
                debug!("Ignoring relayed copy of own group message");
                return;
            }
            let body = open_text(identity, &data, state.own_nickname(), &from);
            state.record(
                ChatId::Group,
                ChatMessage::new(from, Direction::Received, body),
                events,
            );
        }

        ServerMessage::FileShare {
            from,
            to,
            uuid,
            data,
        } => {
            on_file_share(identity, state, events, from, to, uuid, data);
        }

        ServerMessage::UserJoined { nickname } => {
            if state.is_own(&nickname) {
                return;
            }
            state.record(
                ChatId::Group,
                ChatMessage::notice(format!("{nickname} joined the chat room.")),
                events,
            );
            state.record(
                ChatId::peer(nickname.clone()),
                ChatMessage::notice(format!("{nickname} is now online.")),
                events,
            );
        }

        ServerMessage::UserLeft { nickname } => {
            if state.is_own(&nickname) {
                return;
            }
            state.record(
                ChatId::Group,
                ChatMessage::notice(format!("{nickname} left the chat room.")),
                events,
            );
            state.record(
                ChatId::peer(nickname.clone()),
                ChatMessage::notice(format!("{nickname} is offline.")),
                events,
            );
        }

        ServerMessage::NicknameChanged {
            old_nickname,
            new_nickname,
            users,
        } => {
            on_nickname_changed(state, events, old_nickname, new_nickname, users);
        }

        ServerMessage::NicknameError { data } => {
            warn!(reason = %data, "Nickname change rejected");
            emit_event(events, ClientEvent::NicknameRejected { reason: data });
        }
    }
}

fn on_welcome(
    state: &mut ClientState,
    events: &EventSink,
    nickname: String,
    users: HashMap<String, String>,
) {
    state.peers.replace(users);
    state.nickname = Some(nickname.clone());

    let reconnect = state.welcomed;
    if reconnect {
        let chat = state.active_chat();
        state.record(chat, ChatMessage::notice("Reconnected to the chat room."), events);
        info!(nickname = %nickname, "Re-registered after reconnect");
    } else {
        state.welcomed = true;
        state.sessions.select(ChatId::Group);
        state.record(
            ChatId::Group,
            ChatMessage::notice(format!(
                "Welcome, {nickname}! You are connected to the chat room."
            )),
            events,
        );
        info!(nickname = %nickname, peers = state.peers.len(), "Registered");
    }

    emit_event(events, ClientEvent::Welcomed { nickname, reconnect });
    emit_roster(state, events);
}

fn on_file_share(
    identity: &IdentityKeyStore,
    state: &mut ClientState,
    events: &EventSink,
    from: String,
    to: String,
    uuid: Option<TransferId>,
    data: String,
) {
    let sent = state.is_own(&from);
    let chat = match ChatId::from_wire(&to) {
        ChatId::Group => ChatId::Group,
        recipient if sent => recipient,
        ChatId::Peer(_) => ChatId::peer(from.clone()),
    };

    // Our own uploads are recorded locally once the share is sent.
    if sent {
        if let Some(id) = &uuid {
            if has_file(state, &chat, id) {
                debug!(transfer = %id, "Ignoring relayed copy of own file share");
                return;
            }
        }
    }

    let body = match open_metadata(identity, &data, state.own_nickname()) {
        Ok(metadata) => {
            if let Some(id) = &uuid {
                if *id != metadata.uuid {
                    warn!(
                        clear = %id,
                        sealed = %metadata.uuid,
                        "File share id mismatch, trusting sealed id"
                    );
                }
            }
            MessageBody::File { metadata }
        }
        Err(e) => {
            warn!(from = %from, error = %e, "Could not open file share");
            undecryptable(&e)
        }
    };

    let direction = if sent { Direction::Sent } else { Direction::Received };
    state.record(chat, ChatMessage::new(from, direction, body), events);
}

fn on_nickname_changed(
    state: &mut ClientState,
    events: &EventSink,
    old: String,
    new: String,
    users: HashMap<String, String>,
) {
    state.peers.rename(&old, &new);
    state.peers.replace(users);

    let own = state.is_own(&old);
    if own {
        state.nickname = Some(new.clone());
    }

    let text = format!("'{old}' is now known as '{new}'.");
    state.record(ChatId::Group, ChatMessage::notice(text.clone()), events);

    let old_chat = ChatId::peer(old.clone());
    if state.sessions.contains(&old_chat) {
        state.record(old_chat.clone(), ChatMessage::notice(text), events);
    }
    state.sessions.rename(&old_chat, ChatId::peer(new.clone()));

    info!(old = %old, new = %new, own, "Nickname changed");
    emit_event(events, ClientEvent::NicknameChanged { old, new, own });
    emit_roster(state, events);
}

fn has_file(state: &ClientState, chat: &ChatId, id: &TransferId) -> bool {
    state.sessions.history(chat).iter().any(|message| {
        matches!(&message.body, MessageBody::File { metadata } if metadata.uuid == *id)
    })
}

fn open_text(
    identity: &IdentityKeyStore,
    data: &str,
    own_nickname: &str,
    from: &str,
) -> MessageBody {
    let opened = Envelope::from_json(data)
        .map_err(ClientError::from)
        .and_then(|envelope| {
            envelope::decrypt_text(identity, &envelope, own_nickname).map_err(ClientError::from)
        });

    match opened {
        Ok(text) => MessageBody::Text { text },
        Err(e) => {
            warn!(from = %from, error = %e, "Could not decrypt message");
            undecryptable(&e)
        }
    }
}

fn open_metadata(
    identity: &IdentityKeyStore,
    data: &str,
    own_nickname: &str,
) -> Result<FileMetadata, ClientError> {
    let envelope = Envelope::from_json(data)?;
    let plaintext = envelope::decrypt(identity, &envelope, envelope.wrapped_for(own_nickname))?;
    Ok(FileMetadata::from_json(&plaintext)?)
}

fn undecryptable(error: &ClientError) -> MessageBody {
    MessageBody::Undecryptable {
        reason: format!("{UNDECRYPTABLE_PLACEHOLDER} ({error})"),
    }
}

fn emit_roster(state: &ClientState, events: &EventSink) {
    emit_event(
        events,
        ClientEvent::RosterUpdated {
            nicknames: state.peers.nicknames(),
        },
    );
}
