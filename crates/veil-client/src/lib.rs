pub mod bridge;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod messaging;
pub mod peers;
pub mod sessions;
pub mod state;
pub mod transfer;

use tracing_subscriber::{fmt, EnvFilter};

pub use client::Client;
pub use config::{ClientConfig, SelfWrapPolicy};
pub use error::{ClientError, TransferError, TransferStage};
pub use events::{ClientEvent, EventSink};
pub use messaging::seal_for_chat;
pub use peers::PeerDirectory;
pub use sessions::{ChatMessage, Direction, MessageBody, SessionStateStore};
pub use state::ClientState;
pub use transfer::{FileTransferCoordinator, FileTransferRecord, TransferStatus};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// filter. Calling it twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("veil_client=debug,veil_net=debug,veil_shared=info,warn")
    });

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Starting {} client", veil_shared::constants::APP_NAME);
    }
}
