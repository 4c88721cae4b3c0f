use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use veil_net::ConnectionNotification;

use crate::client::Client;
use crate::events::{emit_event, ClientEvent};

/// Drain supervisor notifications into the client until the supervisor ends.
pub async fn run_bridge(client: Client, mut notif_rx: mpsc::Receiver<ConnectionNotification>) {
    info!("Connection bridge started");

    while let Some(notification) = notif_rx.recv().await {
        match notification {
            ConnectionNotification::Connected { attempt } => {
                debug!(attempt, "Connected (bridge)");
                emit_event(client.events(), ClientEvent::Connected);
            }

            ConnectionNotification::Message(message) => {
                if let Err(e) = client.handle_server_message(message) {
                    warn!(error = %e, "Failed to apply server message");
                }
            }

            ConnectionNotification::Disconnected { reason } => {
                info!(reason = %reason, "Disconnected (bridge)");
                emit_event(client.events(), ClientEvent::Disconnected { reason });
            }
        }
    }

    warn!("Connection bridge ended");
}
