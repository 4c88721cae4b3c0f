//! The client context handed to callers.
//!
//! A [`Client`] is cheap to clone. Every clone shares one identity, one
//! [`ClientState`] and one outbound command channel.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{info, warn};

use veil_net::{
    spawn_connection, ConnectionCommand, Connector, FileTransport, HttpFileTransport,
    SupervisorHandle,
};
use veil_shared::identity::IdentityKeyStore;
use veil_shared::protocol::{ClientMessage, FileMetadata, ServerMessage};
use veil_shared::types::{ChatId, PeerKey};

use crate::bridge::run_bridge;
use crate::config::ClientConfig;
use crate::dispatch;
use crate::error::{ClientError, TransferError, TransferStage};
use crate::events::EventSink;
use crate::messaging::{resolve_chat, seal_for_chat};
use crate::sessions::{ChatMessage, Direction, MessageBody};
use crate::state::ClientState;
use crate::transfer::{FileTransferCoordinator, FileTransferRecord, TransferStatus};

#[derive(Clone)]
pub struct Client {
    identity: Arc<IdentityKeyStore>,
    state: Arc<Mutex<ClientState>>,
    outbound: mpsc::Sender<ConnectionCommand>,
    files: FileTransferCoordinator,
    config: ClientConfig,
    events: EventSink,
}

impl Client {
    /// Load the identity, connect over `connector` and start relaying
    /// server messages. File transfers go to `config.server_url`.
    pub fn start<C: Connector>(
        connector: C,
        config: ClientConfig,
        events: EventSink,
    ) -> Result<(Self, SupervisorHandle), ClientError> {
        let transport = Arc::new(HttpFileTransport::new(config.server_url.clone()));
        Self::start_with_transport(connector, transport, config, events)
    }

    pub fn start_with_transport<C: Connector>(
        connector: C,
        transport: Arc<dyn FileTransport>,
        config: ClientConfig,
        events: EventSink,
    ) -> Result<(Self, SupervisorHandle), ClientError> {
        let vault = config.key_vault();
        let identity = Arc::new(IdentityKeyStore::generate_or_load(vault.as_ref())?);
        let state = Arc::new(Mutex::new(ClientState::new()));

        let registration = {
            let identity = identity.clone();
            let state = state.clone();
            move || {
                let state = state.lock().unwrap_or_else(PoisonError::into_inner);
                registration_for(&identity, &state)
            }
        };
        let (outbound, notifications, handle) =
            spawn_connection(connector, registration, config.reconnect_delay);

        let client = Self::from_parts(identity, state, outbound, transport, config, events);
        info!(public_key = %client.public_key_b64(), "Client started");

        tokio::spawn(run_bridge(client.clone(), notifications));
        Ok((client, handle))
    }

    /// Assemble a client around an existing command channel. Nothing is
    /// spawned; server messages must be fed through
    /// [`Client::handle_server_message`].
    pub fn from_parts(
        identity: Arc<IdentityKeyStore>,
        state: Arc<Mutex<ClientState>>,
        outbound: mpsc::Sender<ConnectionCommand>,
        transport: Arc<dyn FileTransport>,
        config: ClientConfig,
        events: EventSink,
    ) -> Self {
        let files = FileTransferCoordinator::new(transport, config.chunk_size, events.clone());
        Self {
            identity,
            state,
            outbound,
            files,
            config,
            events,
        }
    }

    /// The registration this session would send right now.
    pub fn registration(&self) -> Result<ClientMessage, ClientError> {
        let state = self.lock_state()?;
        Ok(registration_for(&self.identity, &state))
    }

    pub(crate) fn lock_state(&self) -> Result<MutexGuard<'_, ClientState>, ClientError> {
        self.state
            .lock()
            .map_err(|e| ClientError::LockPoisoned(e.to_string()))
    }

    pub(crate) async fn send(&self, message: ClientMessage) -> Result<(), ClientError> {
        self.outbound
            .send(ConnectionCommand::Send(message))
            .await
            .map_err(|_| ClientError::ChannelClosed)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn events(&self) -> &EventSink {
        &self.events
    }

    /// Apply one server message to the session state.
    pub fn handle_server_message(&self, message: ServerMessage) -> Result<(), ClientError> {
        let mut state = self.lock_state()?;
        dispatch::dispatch(&self.identity, &mut state, &self.events, message);
        Ok(())
    }

    /// Upload `source`, then announce the file to `chat`.
    ///
    /// A peer recipient is pinned by public key before the upload starts.
    /// The metadata is sealed only after the upload completes, against the
    /// roster at that point, so a peer who renamed meanwhile still gets the
    /// file under their new nickname. Progress events carry a fraction only
    /// when `size_hint` gives the total size.
    pub async fn upload_file<R>(
        &self,
        chat: ChatId,
        filename: &str,
        source: R,
        size_hint: Option<u64>,
    ) -> Result<FileMetadata, ClientError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let pinned = self.pin_recipient(&chat)?;
        let mut record = FileTransferRecord::new(filename);

        let metadata = match self.files.upload(&mut record, source, size_hint).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(file = %filename, error = %e, "Upload failed");
                self.files.fail(&mut record, &e);
                return Err(e.into());
            }
        };

        let target = match self.announce(&chat, pinned.as_ref(), &metadata).await {
            Ok(target) => target,
            Err(e) => {
                warn!(file = %filename, error = %e, "File announce failed");
                self.files.fail(&mut record, &e);
                return Err(e.into());
            }
        };
        self.files.set_status(&mut record, TransferStatus::Complete);

        let mut state = self.lock_state()?;
        let target = resolve_chat(&state.peers, &target, pinned.as_ref()).unwrap_or(target);
        let own = state.own_nickname().to_string();
        state.record(
            target,
            ChatMessage::new(
                own,
                Direction::Sent,
                MessageBody::File {
                    metadata: metadata.clone(),
                },
            ),
            &self.events,
        );
        Ok(metadata)
    }

    /// The public key a peer chat is addressed to right now.
    fn pin_recipient(&self, chat: &ChatId) -> Result<Option<PeerKey>, ClientError> {
        match chat {
            ChatId::Group => Ok(None),
            ChatId::Peer(nickname) => {
                let state = self.lock_state()?;
                let key = state
                    .peers
                    .lookup(nickname)
                    .cloned()
                    .ok_or_else(|| ClientError::UnknownRecipient(nickname.clone()))?;
                Ok(Some(key))
            }
        }
    }

    /// Seal the metadata for whoever `chat` resolves to now and send it.
    /// Returns the chat it went to.
    async fn announce(
        &self,
        chat: &ChatId,
        pinned: Option<&PeerKey>,
        metadata: &FileMetadata,
    ) -> Result<ChatId, TransferError> {
        let announce = |e: ClientError| TransferError::new(TransferStage::Announce, e);

        let plaintext = metadata.to_json().map_err(|e| announce(e.into()))?;
        let (target, envelope) = {
            let state = self.lock_state().map_err(announce)?;
            let target = resolve_chat(&state.peers, chat, pinned)
                .ok_or_else(|| announce(ClientError::UnknownRecipient(chat.to_string())))?;
            let envelope = seal_for_chat(
                &state.peers,
                state.nickname.as_deref(),
                self.config.self_wrap,
                &target,
                plaintext.as_bytes(),
            )
            .map_err(announce)?;
            (target, envelope)
        };
        if target != *chat {
            info!(from = %chat, to = %target, "Recipient renamed during upload");
        }
        let data = envelope.to_json().map_err(|e| announce(e.into()))?;

        self.send(ClientMessage::FileShare {
            to: target.as_wire().to_string(),
            uuid: metadata.uuid.clone(),
            data,
        })
        .await
        .map_err(announce)?;
        Ok(target)
    }

    /// Download and decrypt a shared file into `sink`.
    pub async fn download_file<W>(
        &self,
        metadata: &FileMetadata,
        sink: W,
    ) -> Result<u64, ClientError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match self.files.download(metadata, sink).await {
            Ok(written) => Ok(written),
            Err(e) => {
                warn!(transfer = %metadata.uuid, error = %e, "Download failed");
                Err(e.into())
            }
        }
    }

    pub fn public_key_b64(&self) -> String {
        self.identity.public_key_b64()
    }

    /// Our nickname, once the server has assigned one.
    pub fn nickname(&self) -> Result<Option<String>, ClientError> {
        Ok(self.lock_state()?.nickname.clone())
    }

    /// Make `chat` the active chat and return its history.
    pub fn select_chat(&self, chat: ChatId) -> Result<Vec<ChatMessage>, ClientError> {
        let mut state = self.lock_state()?;
        Ok(state.sessions.select(chat).to_vec())
    }

    pub fn history(&self, chat: &ChatId) -> Result<Vec<ChatMessage>, ClientError> {
        Ok(self.lock_state()?.sessions.history(chat).to_vec())
    }

    pub fn unread(&self, chat: &ChatId) -> Result<usize, ClientError> {
        Ok(self.lock_state()?.sessions.unread(chat))
    }

    pub fn nicknames(&self) -> Result<Vec<String>, ClientError> {
        Ok(self.lock_state()?.peers.nicknames())
    }

    /// Stop the connection supervisor. Pending reconnects are abandoned.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        info!("Shutting down client");
        self.outbound
            .send(ConnectionCommand::Shutdown)
            .await
            .map_err(|_| ClientError::ChannelClosed)
    }
}

fn registration_for(identity: &IdentityKeyStore, state: &ClientState) -> ClientMessage {
    ClientMessage::Register {
        client_id: state.client_id.clone(),
        public_key: identity.public_key_b64(),
        proposed_nickname: state.own_nickname().to_string(),
    }
}
