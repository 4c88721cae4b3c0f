use serde::Serialize;
use tokio::sync::mpsc;

use crate::sessions::ChatMessage;
use crate::transfer::TransferStatus;

/// Where the client reports what happened; a UI layer drains the receiver.
pub type EventSink = mpsc::UnboundedSender<ClientEvent>;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientEvent {
    Connected,
    Disconnected {
        reason: String,
    },
    Welcomed {
        nickname: String,
        reconnect: bool,
    },
    RosterUpdated {
        nicknames: Vec<String>,
    },
    /// A message landed in the active chat.
    MessageSurfaced {
        chat: String,
        message: ChatMessage,
    },
    /// A message landed in a background chat.
    UnreadChanged {
        chat: String,
        unread: usize,
    },
    NicknameChanged {
        old: String,
        new: String,
        own: bool,
    },
    NicknameRejected {
        reason: String,
    },
    TransferStatusChanged {
        transfer: Option<String>,
        filename: String,
        status: TransferStatus,
    },
    TransferProgress {
        transfer: String,
        filename: String,
        bytes: u64,
        /// In `[0, 1]`; `None` when the total size is unknown.
        fraction: Option<f64>,
    },
    TransferFailed {
        transfer: Option<String>,
        filename: String,
        error: String,
    },
}

pub fn emit_event(sink: &EventSink, event: ClientEvent) {
    if let Err(e) = sink.send(event) {
        tracing::debug!(event = ?e.0, "No event listener, dropping event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::Direction;

    #[test]
    fn test_event_json_shape() {
        let event = ClientEvent::MessageSurfaced {
            chat: "group".into(),
            message: ChatMessage::text("alice", Direction::Received, "hi"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "messageSurfaced");
        assert_eq!(json["chat"], "group");
        assert_eq!(json["message"]["body"]["kind"], "text");
        assert_eq!(json["message"]["body"]["text"], "hi");

        let json = serde_json::to_value(ClientEvent::TransferStatusChanged {
            transfer: None,
            filename: "a.bin".into(),
            status: TransferStatus::Uploading,
        })
        .unwrap();
        assert_eq!(json["status"], "uploading");
        assert!(json["transfer"].is_null());
    }

    #[test]
    fn test_emit_without_listener_is_silent() {
        let (sink, rx) = mpsc::unbounded_channel();
        drop(rx);
        emit_event(&sink, ClientEvent::Connected);
    }
}
