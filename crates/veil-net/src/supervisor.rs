//! Connection supervisor with tokio mpsc command/notification channels.
//!
//! The supervisor owns the live connection in a dedicated task. It
//! registers first on every connect, forwards outbound commands and inbound
//! server messages, and reconnects after a fixed delay forever.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use veil_shared::protocol::{ClientMessage, ServerMessage};

use crate::connection::Connector;

const CHANNEL_CAPACITY: usize = 256;

/// Commands sent *into* the supervisor task.
#[derive(Debug)]
pub enum ConnectionCommand {
    /// Send a message on the current connection.
    Send(ClientMessage),
    /// Stop reconnecting and end the task.
    Shutdown,
}

/// Notifications sent *from* the supervisor task.
#[derive(Debug, Clone)]
pub enum ConnectionNotification {
    /// Connected and registered. `attempt` counts every connect attempt so far.
    Connected { attempt: u64 },
    /// A server message arrived.
    Message(ServerMessage),
    /// The connection dropped; a reconnect is scheduled.
    Disconnected { reason: String },
}

/// Owner handle of the supervisor task.
#[derive(Debug)]
pub struct SupervisorHandle {
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    /// Cancel the task immediately, including any pending reconnect.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to end (after `Shutdown` or once every sender is dropped).
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                warn!(error = %e, "Connection supervisor panicked");
            }
        }
    }
}

/// Spawn the connection supervisor in a background tokio task.
///
/// `registration` is called on every successful connect, so it always
/// reflects the freshest session state (e.g. the last assigned nickname).
///
/// Returns `(command_tx, notification_rx, handle)`.
pub fn spawn_connection<C, R>(
    connector: C,
    registration: R,
    reconnect_delay: Duration,
) -> (
    mpsc::Sender<ConnectionCommand>,
    mpsc::Receiver<ConnectionNotification>,
    SupervisorHandle,
)
where
    C: Connector,
    R: Fn() -> ClientMessage + Send + Sync + 'static,
{
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<ConnectionCommand>(CHANNEL_CAPACITY);
    let (notif_tx, notif_rx) = mpsc::channel::<ConnectionNotification>(CHANNEL_CAPACITY);

    let task = tokio::spawn(async move {
        let mut attempt: u64 = 0;

        'supervise: loop {
            attempt += 1;

            let mut conn = match connector.connect().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        delay_ms = reconnect_delay.as_millis() as u64,
                        "Connect failed, retrying"
                    );
                    if wait_or_shutdown(&mut cmd_rx, reconnect_delay).await {
                        break 'supervise;
                    }
                    continue;
                }
            };

            let register = registration();
            if let Err(e) = conn.send(&register).await {
                warn!(attempt, error = %e, "Registration failed, retrying");
                if wait_or_shutdown(&mut cmd_rx, reconnect_delay).await {
                    break 'supervise;
                }
                continue;
            }

            info!(attempt, "Connected and registered");
            if notif_tx
                .send(ConnectionNotification::Connected { attempt })
                .await
                .is_err()
            {
                break 'supervise;
            }

            let reason = loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        match cmd {
                            Some(ConnectionCommand::Send(message)) => {
                                debug!(kind = message.kind(), "Sending message");
                                if let Err(e) = conn.send(&message).await {
                                    break e.to_string();
                                }
                            }
                            Some(ConnectionCommand::Shutdown) => {
                                info!("Connection shutdown requested");
                                break 'supervise;
                            }
                            None => {
                                info!("Command channel closed, shutting down connection");
                                break 'supervise;
                            }
                        }
                    }

                    incoming = conn.recv() => {
                        match incoming {
                            Ok(Some(message)) => {
                                debug!(kind = message.kind(), "Server message received");
                                if notif_tx
                                    .send(ConnectionNotification::Message(message))
                                    .await
                                    .is_err()
                                {
                                    break 'supervise;
                                }
                            }
                            Ok(None) => break "closed by server".to_string(),
                            Err(e) => break e.to_string(),
                        }
                    }
                }
            };

            warn!(
                reason = %reason,
                delay_ms = reconnect_delay.as_millis() as u64,
                "Disconnected, reconnect scheduled"
            );
            if notif_tx
                .send(ConnectionNotification::Disconnected { reason })
                .await
                .is_err()
            {
                break 'supervise;
            }
            if wait_or_shutdown(&mut cmd_rx, reconnect_delay).await {
                break 'supervise;
            }
        }

        info!("Connection supervisor terminated");
    });

    (cmd_tx, notif_rx, SupervisorHandle { task })
}

/// Sleep for `delay`, dropping outbound messages that arrive meanwhile.
/// Returns `true` if a shutdown was requested.
async fn wait_or_shutdown(cmd_rx: &mut mpsc::Receiver<ConnectionCommand>, delay: Duration) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ConnectionCommand::Send(message)) => {
                        warn!(kind = message.kind(), "Not connected, dropping outbound message");
                    }
                    Some(ConnectionCommand::Shutdown) | None => return true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::memory::MemoryConnector;

    const DELAY: Duration = Duration::from_millis(20);
    const TIMEOUT: Duration = Duration::from_secs(5);

    fn register(nickname: &str) -> ClientMessage {
        ClientMessage::Register {
            client_id: "c-1".into(),
            public_key: "pk".into(),
            proposed_nickname: nickname.into(),
        }
    }

    async fn next_notification(
        rx: &mut mpsc::Receiver<ConnectionNotification>,
    ) -> ConnectionNotification {
        tokio::time::timeout(TIMEOUT, rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_registers_first_and_relays_both_ways() {
        let (connector, mut accepted) = MemoryConnector::new();
        let (cmd_tx, mut notif_rx, handle) = spawn_connection(connector, || register(""), DELAY);

        let mut server = accepted.recv().await.unwrap();
        assert_eq!(server.recv().await, Some(register("")));
        assert!(matches!(
            next_notification(&mut notif_rx).await,
            ConnectionNotification::Connected { attempt: 1 }
        ));

        cmd_tx
            .send(ConnectionCommand::Send(ClientMessage::GroupMessage { data: "d".into() }))
            .await
            .unwrap();
        assert_eq!(
            server.recv().await,
            Some(ClientMessage::GroupMessage { data: "d".into() })
        );

        server
            .send(ServerMessage::UserJoined {
                nickname: "bob".into(),
            })
            .unwrap();
        assert!(matches!(
            next_notification(&mut notif_rx).await,
            ConnectionNotification::Message(ServerMessage::UserJoined { .. })
        ));

        cmd_tx.send(ConnectionCommand::Shutdown).await.unwrap();
        tokio::time::timeout(TIMEOUT, handle.join()).await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_reads_fresh_registration() {
        let counter = Arc::new(AtomicU64::new(0));
        let seen = counter.clone();
        let (connector, mut accepted) = MemoryConnector::new();
        let (_cmd_tx, mut notif_rx, handle) = spawn_connection(
            connector,
            move || register(&format!("nick-{}", seen.fetch_add(1, Ordering::SeqCst))),
            DELAY,
        );

        let mut first = accepted.recv().await.unwrap();
        assert_eq!(first.recv().await, Some(register("nick-0")));
        next_notification(&mut notif_rx).await;

        drop(first);
        assert!(matches!(
            next_notification(&mut notif_rx).await,
            ConnectionNotification::Disconnected { .. }
        ));

        let mut second = tokio::time::timeout(TIMEOUT, accepted.recv()).await.unwrap().unwrap();
        assert_eq!(second.recv().await, Some(register("nick-1")));
        assert!(matches!(
            next_notification(&mut notif_rx).await,
            ConnectionNotification::Connected { attempt: 2 }
        ));

        handle.abort();
    }

    #[tokio::test]
    async fn test_retries_failed_connects_forever() {
        let (connector, mut accepted) = MemoryConnector::new();
        connector.refuse_next(3);
        let (_cmd_tx, mut notif_rx, handle) = spawn_connection(connector, || register(""), DELAY);

        let _server = tokio::time::timeout(TIMEOUT, accepted.recv()).await.unwrap().unwrap();
        assert!(matches!(
            next_notification(&mut notif_rx).await,
            ConnectionNotification::Connected { attempt: 4 }
        ));
        handle.abort();
    }

    #[tokio::test]
    async fn test_dropping_senders_ends_task() {
        let (connector, _accepted) = MemoryConnector::new();
        let (cmd_tx, _notif_rx, handle) = spawn_connection(connector, || register(""), DELAY);
        drop(cmd_tx);
        tokio::time::timeout(TIMEOUT, handle.join()).await.unwrap();
    }
}
